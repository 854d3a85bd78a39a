//! Client builder.
//!
//! Provides a fluent API for configuring and connecting a [`Client`].

use std::sync::Arc;
use std::time::Duration;

use crate::transport::{Dialer, NetDialer};
use crate::{Client, ClientError, CodecType, Options, xdial_with};

/// Builder for connecting a [`Client`].
///
/// # Example
///
/// ```ignore
/// use muxrpc_client::{Client, CodecType};
/// use std::time::Duration;
///
/// let client = Client::builder("http@127.0.0.1:7001")
///     .codec(CodecType::Json)
///     .connect_timeout(Duration::from_secs(2))
///     .connect()
///     .await?;
/// ```
pub struct ClientBuilder {
    /// Compound address, e.g. "tcp@127.0.0.1:9999".
    rpc_addr: String,
    options: Options,
    /// How transports are opened. Defaults to [`NetDialer`].
    dialer: Arc<dyn Dialer>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("rpc_addr", &self.rpc_addr)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Create a builder for a `scheme@address` string.
    pub fn new<S: Into<String>>(rpc_addr: S) -> Self {
        Self {
            rpc_addr: rpc_addr.into(),
            options: Options::default(),
            dialer: Arc::new(NetDialer),
        }
    }

    /// Select the payload codec.
    pub fn codec(mut self, codec_type: CodecType) -> Self {
        self.options = self.options.codec(codec_type);
        self
    }

    /// Bound connecting plus the handshake. `Duration::ZERO` waits forever.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.connect_timeout(timeout);
        self
    }

    /// Server-side handling deadline advertised to the server.
    pub fn handle_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.handle_timeout(timeout);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Open transports with a custom [`Dialer`].
    pub fn dialer<D: Dialer + 'static>(mut self, dialer: D) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    pub fn get_rpc_addr(&self) -> &str {
        &self.rpc_addr
    }

    pub fn get_options(&self) -> &Options {
        &self.options
    }

    /// Dial, handshake and return the connected client.
    pub async fn connect(self) -> Result<Client, ClientError> {
        xdial_with(self.dialer.as_ref(), &self.rpc_addr, self.options).await
    }
}
