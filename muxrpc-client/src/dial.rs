//! Opening connections.
//!
//! Every entry point opens a transport through a [`Dialer`] and then runs the
//! handshake on a spawned worker, bounded by the options' connect timeout.
//!
//! | Function | Transport |
//! |----------|-----------|
//! | [`dial`] / [`dial_with`] | plain stream |
//! | [`dial_http`] / [`dial_http_with`] | HTTP CONNECT tunnel, then the stream |
//! | [`xdial`] / [`xdial_with`] | chosen by a `scheme@address` string |

use std::future::Future;
use std::io;

use crate::transport::{BoxedTransport, Dialer, NetDialer};
use crate::tunnel::http_handshake;
use crate::{Client, ClientError, Options};

/// Connect to `address` over `network` (`tcp` or `unix`) with the built-in
/// [`NetDialer`].
pub async fn dial(network: &str, address: &str, options: Options) -> Result<Client, ClientError> {
    dial_with(&NetDialer, network, address, options).await
}

/// Connect through a caller-supplied [`Dialer`].
pub async fn dial_with(
    dialer: &dyn Dialer,
    network: &str,
    address: &str,
    options: Options,
) -> Result<Client, ClientError> {
    dial_timeout(dialer, network, address, options, |transport, options| {
        Client::handshake(transport, options)
    })
    .await
}

/// Connect to an HTTP server that upgrades `CONNECT /_muxrpc_` requests.
pub async fn dial_http(
    network: &str,
    address: &str,
    options: Options,
) -> Result<Client, ClientError> {
    dial_http_with(&NetDialer, network, address, options).await
}

/// [`dial_http`] through a caller-supplied [`Dialer`].
pub async fn dial_http_with(
    dialer: &dyn Dialer,
    network: &str,
    address: &str,
    options: Options,
) -> Result<Client, ClientError> {
    dial_timeout(dialer, network, address, options, http_handshake).await
}

/// Connect using a compound address of the form `scheme@address`.
///
/// `http@host:port` tunnels over TCP; any other scheme is used as the network,
/// e.g. `tcp@127.0.0.1:9999` or `unix@/tmp/muxrpc.sock`.
pub async fn xdial(rpc_addr: &str, options: Options) -> Result<Client, ClientError> {
    xdial_with(&NetDialer, rpc_addr, options).await
}

/// [`xdial`] through a caller-supplied [`Dialer`].
pub async fn xdial_with(
    dialer: &dyn Dialer,
    rpc_addr: &str,
    options: Options,
) -> Result<Client, ClientError> {
    let (scheme, address) = parse_rpc_addr(rpc_addr)?;
    match scheme {
        "http" => dial_http_with(dialer, "tcp", address, options).await,
        network => dial_with(dialer, network, address, options).await,
    }
}

/// Split `scheme@address`. Both parts must be non-empty and there must be
/// exactly one `@`.
pub(crate) fn parse_rpc_addr(rpc_addr: &str) -> Result<(&str, &str), ClientError> {
    let mut parts = rpc_addr.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(address), None) if !scheme.is_empty() && !address.is_empty() => {
            Ok((scheme, address))
        }
        _ => Err(ClientError::Config(format!(
            "rpc client: wrong format '{rpc_addr}', expect protocol@addr"
        ))),
    }
}

/// Open the transport, then race the handshake against the connect timeout.
///
/// On expiry the worker is aborted, which drops the transport.
async fn dial_timeout<H, Fut>(
    dialer: &dyn Dialer,
    network: &str,
    address: &str,
    options: Options,
    handshake: H,
) -> Result<Client, ClientError>
where
    H: FnOnce(BoxedTransport, Options) -> Fut,
    Fut: Future<Output = Result<Client, ClientError>> + Send + 'static,
{
    let connect_timeout = options.get_connect_timeout();

    let transport = dialer
        .dial(network, address, connect_timeout)
        .await
        .map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => ClientError::Timeout(connect_timeout),
            _ => ClientError::Transport(err.to_string()),
        })?;

    #[cfg(feature = "tracing")]
    tracing::debug!(network, address, "transport open, starting handshake");

    let mut worker = tokio::spawn(handshake(transport, options));

    let joined = if connect_timeout.is_zero() {
        worker.await
    } else {
        match tokio::time::timeout(connect_timeout, &mut worker).await {
            Ok(joined) => joined,
            Err(_) => {
                worker.abort();

                #[cfg(feature = "tracing")]
                tracing::debug!(network, address, ?connect_timeout, "handshake timed out");

                return Err(ClientError::Timeout(connect_timeout));
            }
        }
    };

    joined.map_err(|err| ClientError::Transport(format!("handshake worker failed: {err}")))?
}
