//! Byte-stream transports and the dialer seam.
//!
//! The client runs over any bidirectional byte stream. [`Dialer`] opens such a
//! stream for a `(network, address)` pair. [`NetDialer`] is the built-in
//! implementation for `tcp` and, on unix targets, `unix` sockets.
//!
//! # Example
//!
//! ```ignore
//! use muxrpc_client::transport::{Dialer, NetDialer};
//! use std::time::Duration;
//!
//! let stream = NetDialer.dial("tcp", "127.0.0.1:9999", Duration::from_secs(1)).await?;
//! ```

use std::io;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A bidirectional byte stream a client can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport, as stored by the client.
pub type BoxedTransport = Box<dyn Transport>;

/// Opens transports.
///
/// `timeout` bounds the connection attempt only. `Duration::ZERO` means no
/// bound. An expired attempt should fail with [`io::ErrorKind::TimedOut`],
/// which the client reports as [`ClientError::Timeout`](crate::ClientError::Timeout).
pub trait Dialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<BoxedTransport>>;
}

/// Dials `tcp` and `unix` addresses with tokio's networking types.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetDialer;

impl NetDialer {
    async fn connect(network: &str, address: &str) -> io::Result<BoxedTransport> {
        match network {
            "tcp" | "tcp4" | "tcp6" => {
                let stream = TcpStream::connect(address).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            "unix" => Ok(Box::new(tokio::net::UnixStream::connect(address).await?)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported network: {other}"),
            )),
        }
    }
}

impl Dialer for NetDialer {
    fn dial<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<BoxedTransport>> {
        Box::pin(async move {
            #[cfg(feature = "tracing")]
            tracing::debug!(network, address, "dialing");

            if timeout.is_zero() {
                return Self::connect(network, address).await;
            }

            tokio::time::timeout(timeout, Self::connect(network, address))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("dial {network} {address}: timed out after {timeout:?}"),
                    )
                })?
        })
    }
}
