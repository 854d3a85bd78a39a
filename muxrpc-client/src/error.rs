//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for every muxrpc
//! client operation.

use std::io;
use std::time::Duration;

use muxrpc_core::CodecError;

/// Client-side error variants.
///
/// `Clone` because a single connection failure is fanned out to every call
/// that was pending at the time.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The client is closing or the connection has shut down. Terminal: the
    /// client must be discarded.
    #[error("connection is shut down")]
    Shutdown,

    /// Connecting or a call deadline took longer than allowed.
    #[error("timeout: expect within {0:?}")]
    Timeout(Duration),

    /// The peer violated the protocol (handshake, tunnel or framing).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller cancelled the call before it completed.
    #[error("call canceled")]
    Canceled,

    /// Reading or writing the underlying stream failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with an error.
    #[error("{0}")]
    Remote(String),

    /// Arguments could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A reply could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid caller-supplied configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns true for [`ClientError::Shutdown`].
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ClientError::Shutdown)
    }

    /// Returns true if the server reported this error.
    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote(_))
    }

    /// Get the error message, if the variant carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Protocol(msg)
            | ClientError::Transport(msg)
            | ClientError::Remote(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Config(msg) => Some(msg),
            ClientError::Shutdown | ClientError::Timeout(_) | ClientError::Canceled => None,
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io { message, .. } => ClientError::Transport(message),
            CodecError::Encode(msg) => ClientError::Encode(msg),
            CodecError::Decode(msg) => ClientError::Decode(msg),
            err @ (CodecError::UnexpectedFrame { .. }
            | CodecError::FrameTooLarge { .. }
            | CodecError::UnknownCodec(_)
            | CodecError::BadMagic { .. }) => ClientError::Protocol(err.to_string()),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
