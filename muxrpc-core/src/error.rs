//! Wire-level error types.
//!
//! [`CodecError`] covers everything that can go wrong while moving frames
//! across the byte stream: I/O, payload (de)serialization, framing violations,
//! and handshake preamble validation.

use std::io;

use crate::envelope::FrameKind;

/// Errors produced by the wire codec and the handshake preamble.
///
/// The type is `Clone` so that a single connection failure can be reported to
/// every waiter that observes it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The underlying byte stream failed.
    #[error("i/o error: {message}")]
    Io {
        kind: io::ErrorKind,
        message: String,
    },

    /// A header or payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A header or payload could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame of the wrong kind arrived (e.g. a body where a header belongs).
    #[error("unexpected frame: expected {expected}, got kind 0x{actual:02x}")]
    UnexpectedFrame { expected: FrameKind, actual: u8 },

    /// A frame announced a length above the configured limit.
    #[error("frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// The codec name does not match any supported wire format.
    #[error("unknown codec type {0:?}")]
    UnknownCodec(String),

    /// The handshake preamble carried a foreign protocol identifier.
    #[error("invalid magic number {actual:#x}, expected {expected:#x}")]
    BadMagic { expected: u32, actual: u32 },
}

impl CodecError {
    /// Returns true when the peer closed the stream between frames.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            CodecError::Io {
                kind: io::ErrorKind::UnexpectedEof,
                ..
            }
        )
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
