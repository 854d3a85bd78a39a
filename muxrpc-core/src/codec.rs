//! Payload serialization formats.
//!
//! A connection picks one [`CodecType`] during the handshake and uses it for
//! every header and body on the stream:
//! - [`CodecType::Json`]: `application/json`, via serde_json
//! - [`CodecType::Postcard`]: `application/postcard`, a compact binary format
//!
//! Adding a wire format means adding a variant here; the framing and the client
//! engine stay untouched.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Supported payload encodings, keyed by their handshake name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecType {
    /// Human-readable JSON.
    Json,
    /// Compact binary encoding.
    #[default]
    Postcard,
}

impl CodecType {
    /// Every codec this build understands.
    pub const ALL: [CodecType; 2] = [CodecType::Json, CodecType::Postcard];

    /// Look up a codec by the name carried in the handshake preamble.
    ///
    /// Returns `None` for names that do not match a supported format.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "application/json" => Some(Self::Json),
            "application/postcard" => Some(Self::Postcard),
            _ => None,
        }
    }

    /// The name used in the handshake preamble.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Postcard => "application/postcard",
        }
    }

    /// Serialize a value with this codec.
    pub fn encode<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| CodecError::Encode(format!("JSON encoding failed: {e}"))),
            Self::Postcard => postcard::to_allocvec(value)
                .map(Bytes::from)
                .map_err(|e| CodecError::Encode(format!("postcard encoding failed: {e}"))),
        }
    }

    /// Deserialize a value with this codec.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| CodecError::Decode(format!("JSON decoding failed: {e}"))),
            Self::Postcard => postcard::from_bytes(bytes)
                .map_err(|e| CodecError::Decode(format!("postcard decoding failed: {e}"))),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| CodecError::UnknownCodec(s.to_string()))
    }
}
