//! Core wire types for muxrpc.
//!
//! This crate provides the pieces of the protocol that client and server
//! share: the handshake preamble, the per-message header, payload codecs and
//! envelope framing.
//!
//! ## Modules
//!
//! - [`options`]: Connection options and the JSON handshake preamble
//! - [`header`]: The request/response header
//! - [`codec`]: Payload codecs, selected by name at handshake time
//! - [`envelope`]: `[kind:1][length:4][payload]` framing
//! - [`frame`]: Async reader/writer halves over a byte stream
//! - [`error`]: [`CodecError`]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod header;
pub mod options;

pub use codec::CodecType;
pub use envelope::{ENVELOPE_HEADER_SIZE, FrameKind, MAX_FRAME_SIZE, frame_kind};
pub use error::CodecError;
pub use frame::{FrameReader, FrameWriter};
pub use header::Header;
pub use options::{DEFAULT_CONNECT_TIMEOUT, MAGIC_NUMBER, MAX_PREAMBLE_SIZE, Options};
