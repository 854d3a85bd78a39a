//! HTTP CONNECT bootstrap.
//!
//! A muxrpc server can share a port with an HTTP server. The client sends
//! `CONNECT /_muxrpc_ HTTP/1.0`, and once the server answers with
//! [`CONNECTED`] the same stream carries the RPC protocol.

use http::StatusCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::transport::BoxedTransport;
use crate::{Client, ClientError, Options};

/// Request path that servers upgrade to the RPC protocol.
pub const DEFAULT_RPC_PATH: &str = "/_muxrpc_";

/// Status text a server answers a successful CONNECT with.
pub const CONNECTED: &str = "200 Connected to muxrpc";

/// Upper bound on the response head, status line included.
const MAX_RESPONSE_HEAD: u64 = 8 * 1024;

/// Tunnel through CONNECT, then run the regular handshake on the same stream.
///
/// The stream stays wrapped in the reader used for the response head, so
/// anything the server sent right after it is not lost.
pub(crate) async fn http_handshake(
    transport: BoxedTransport,
    options: Options,
) -> Result<Client, ClientError> {
    let mut stream = BufReader::new(transport);
    connect_tunnel(&mut stream, DEFAULT_RPC_PATH).await?;
    Client::handshake(stream, options).await
}

/// Send a CONNECT request for `path` and check the server accepted it.
pub(crate) async fn connect_tunnel<S>(stream: &mut S, path: &str) -> Result<(), ClientError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    stream
        .write_all(format!("CONNECT {path} HTTP/1.0\n\n").as_bytes())
        .await?;
    stream.flush().await?;

    let status = read_response_head(stream).await?;
    if status != CONNECTED {
        return Err(ClientError::Protocol(format!(
            "unexpected HTTP response: {status}"
        )));
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(path, "HTTP tunnel established");

    Ok(())
}

/// Read one HTTP response head and return its status (`"<code> <reason>"`).
/// Header lines are consumed and ignored.
async fn read_response_head<S>(stream: &mut S) -> Result<String, ClientError>
where
    S: AsyncBufRead + Unpin,
{
    let mut head = stream.take(MAX_RESPONSE_HEAD);

    let status_line = read_line(&mut head).await?;
    let status = parse_status_line(&status_line)?;

    loop {
        let line = read_line(&mut head).await?;
        if line.is_empty() {
            return Ok(status);
        }
    }
}

async fn read_line<S>(head: &mut S) -> Result<String, ClientError>
where
    S: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = head.read_line(&mut line).await?;
    if n == 0 || !line.ends_with('\n') {
        return Err(ClientError::Protocol(
            "connection closed inside HTTP response".into(),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_status_line(line: &str) -> Result<String, ClientError> {
    let malformed = || ClientError::Protocol(format!("malformed HTTP status line: {line:?}"));

    let (version, status) = line.split_once(' ').ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }

    let status = status.trim_start();
    let code = status.split(' ').next().unwrap_or_default();
    StatusCode::from_bytes(code.as_bytes()).map_err(|_| malformed())?;

    Ok(status.to_string())
}
