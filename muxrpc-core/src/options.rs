//! Connection options and the handshake preamble.
//!
//! Right after the transport opens, the client writes its [`Options`] as a
//! single JSON object terminated by `\n`. The server reads that line, checks
//! the magic number, and switches the rest of the stream to the selected
//! [`CodecType`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::CodecType;
use crate::error::CodecError;

/// Protocol identifier carried in every preamble.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Default time allowed to open the transport and finish the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the preamble line, newline included.
pub const MAX_PREAMBLE_SIZE: u64 = 4096;

/// Options negotiated once per connection.
///
/// # Example
///
/// ```
/// use muxrpc_core::{CodecType, Options};
/// use std::time::Duration;
///
/// let options = Options::new()
///     .codec(CodecType::Json)
///     .connect_timeout(Duration::from_secs(1));
///
/// assert_eq!(options.codec_type(), CodecType::Json);
/// assert_eq!(options.get_connect_timeout(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    codec_type: CodecType,
    connect_timeout: Duration,
    handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            codec_type: CodecType::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    /// Create options with the defaults: postcard codec, 10s connect timeout,
    /// no handle timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the payload codec.
    pub fn codec(mut self, codec_type: CodecType) -> Self {
        self.codec_type = codec_type;
        self
    }

    /// Set the connect timeout. `Duration::ZERO` disables it.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the server-side handling deadline advertised in the preamble.
    /// `Duration::ZERO` means no deadline.
    pub fn handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// The protocol identifier. Always [`MAGIC_NUMBER`].
    pub fn magic_number(&self) -> u32 {
        MAGIC_NUMBER
    }

    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_handle_timeout(&self) -> Duration {
        self.handle_timeout
    }

    /// Serialize the preamble line, trailing newline included.
    pub fn to_preamble(&self) -> Result<Vec<u8>, CodecError> {
        let preamble = Preamble {
            magic_number: MAGIC_NUMBER,
            codec_type: self.codec_type.as_str().to_string(),
            connect_timeout: self.connect_timeout,
            handle_timeout: self.handle_timeout,
        };
        let mut line = serde_json::to_vec(&preamble)
            .map_err(|e| CodecError::Encode(format!("preamble encoding failed: {e}")))?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse and validate a preamble line.
    ///
    /// Fails with [`CodecError::BadMagic`] for a foreign protocol identifier and
    /// [`CodecError::UnknownCodec`] for an unsupported codec name.
    pub fn from_preamble(line: &[u8]) -> Result<Self, CodecError> {
        let preamble: Preamble = serde_json::from_slice(line.trim_ascii_end())
            .map_err(|e| CodecError::Decode(format!("preamble decoding failed: {e}")))?;

        if preamble.magic_number != MAGIC_NUMBER {
            return Err(CodecError::BadMagic {
                expected: MAGIC_NUMBER,
                actual: preamble.magic_number,
            });
        }

        Ok(Self {
            codec_type: preamble.codec_type.parse()?,
            connect_timeout: preamble.connect_timeout,
            handle_timeout: preamble.handle_timeout,
        })
    }

    /// Write the preamble to a stream and flush it.
    pub async fn write_preamble<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let line = self.to_preamble()?;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one preamble line from a buffered stream and validate it.
    ///
    /// Only the preamble is consumed; frames that follow stay in the buffer.
    pub async fn read_preamble<R>(reader: &mut R) -> Result<Self, CodecError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        let n = reader
            .take(MAX_PREAMBLE_SIZE)
            .read_until(b'\n', &mut line)
            .await?;

        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        if line.last() != Some(&b'\n') {
            return Err(CodecError::Decode(format!(
                "preamble not terminated within {MAX_PREAMBLE_SIZE} bytes"
            )));
        }

        Self::from_preamble(&line)
    }
}

/// Wire shape of the preamble.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Preamble {
    magic_number: u32,
    codec_type: String,
    #[serde(default, with = "duration_nanos")]
    connect_timeout: Duration,
    #[serde(default, with = "duration_nanos")]
    handle_timeout: Duration,
}

/// Durations travel as signed nanosecond counts.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = Options::new();
        assert_eq!(options.magic_number(), MAGIC_NUMBER);
        assert_eq!(options.codec_type(), CodecType::Postcard);
        assert_eq!(options.get_connect_timeout(), Duration::from_secs(10));
        assert_eq!(options.get_handle_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_preamble_wire_shape() {
        let options = Options::new()
            .codec(CodecType::Json)
            .connect_timeout(Duration::from_millis(1))
            .handle_timeout(Duration::ZERO);
        let line = options.to_preamble().unwrap();

        assert_eq!(line.last(), Some(&b'\n'));
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["MagicNumber"], 0x3bef5c);
        assert_eq!(value["CodecType"], "application/json");
        assert_eq!(value["ConnectTimeout"], 1_000_000);
        assert_eq!(value["HandleTimeout"], 0);
    }

    #[test]
    fn test_from_preamble_parses_own_output() {
        let options = Options::new().handle_timeout(Duration::from_secs(3));
        let parsed = Options::from_preamble(&options.to_preamble().unwrap()).unwrap();
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_from_preamble_bad_magic() {
        let line = br#"{"MagicNumber":1,"CodecType":"application/json"}"#;
        let err = Options::from_preamble(line).unwrap_err();
        assert_eq!(
            err,
            CodecError::BadMagic {
                expected: MAGIC_NUMBER,
                actual: 1
            }
        );
    }

    #[test]
    fn test_from_preamble_unknown_codec() {
        let line = format!(r#"{{"MagicNumber":{MAGIC_NUMBER},"CodecType":"application/gob"}}"#);
        let err = Options::from_preamble(line.as_bytes()).unwrap_err();
        assert_eq!(err, CodecError::UnknownCodec("application/gob".into()));
    }

    #[tokio::test]
    async fn test_read_preamble_leaves_following_bytes() {
        let mut bytes = Options::new().to_preamble().unwrap();
        bytes.extend_from_slice(b"rest");

        let mut reader = tokio::io::BufReader::new(&bytes[..]);
        let options = Options::read_preamble(&mut reader).await.unwrap();
        assert_eq!(options, Options::new());

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"rest");
    }

    #[tokio::test]
    async fn test_read_preamble_eof() {
        let mut reader = tokio::io::BufReader::new(&b""[..]);
        let err = Options::read_preamble(&mut reader).await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn test_read_preamble_unterminated() {
        let bytes = vec![b'{'; (MAX_PREAMBLE_SIZE + 10) as usize];
        let mut reader = tokio::io::BufReader::new(&bytes[..]);
        let err = Options::read_preamble(&mut reader).await.unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
