//! muxrpc envelope framing.
//!
//! Every header and every body travels in its own envelope:
//!
//! ```text
//! [kind:1][length:4][payload:length]
//! ```
//!
//! The length is big-endian. A request or response is always a header
//! envelope immediately followed by a body envelope.

use std::fmt;

use crate::error::CodecError;

/// Envelope kind bytes.
pub mod frame_kind {
    /// Serialized [`Header`](crate::Header).
    pub const HEADER: u8 = 0x00;
    /// Serialized argument or reply payload.
    pub const BODY: u8 = 0x01;
}

/// Size of the envelope prefix (kind + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Largest payload accepted in a single envelope (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The two envelope kinds, as a typed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Header,
    Body,
}

impl FrameKind {
    /// The wire byte for this kind.
    pub fn as_u8(self) -> u8 {
        match self {
            FrameKind::Header => frame_kind::HEADER,
            FrameKind::Body => frame_kind::BODY,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Header => f.write_str("header"),
            FrameKind::Body => f.write_str("body"),
        }
    }
}

/// Append an envelope holding `payload` to `out`.
pub fn wrap_envelope(kind: FrameKind, payload: &[u8], out: &mut Vec<u8>) {
    out.reserve(ENVELOPE_HEADER_SIZE + payload.len());
    out.push(kind.as_u8());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

/// Parse and validate an envelope prefix.
///
/// Returns the payload length if the kind matches `expected` and the length
/// fits within `limit`.
pub fn parse_envelope_header(
    prefix: &[u8; ENVELOPE_HEADER_SIZE],
    expected: FrameKind,
    limit: usize,
) -> Result<usize, CodecError> {
    let kind = prefix[0];
    if kind != expected.as_u8() {
        return Err(CodecError::UnexpectedFrame {
            expected,
            actual: kind,
        });
    }

    let length = u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
    if length > limit {
        return Err(CodecError::FrameTooLarge {
            size: length,
            limit,
        });
    }

    Ok(length)
}
