//! Async frame reader and writer.
//!
//! This module provides:
//! - [`FrameWriter`]: writes a header envelope plus a body envelope as one
//!   contiguous write.
//! - [`FrameReader`]: reads a header, then the matching body, keeping the
//!   stream aligned even when the body is discarded.
//!
//! The two halves are independent so that one task can read while another
//! writes on the same connection.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::CodecType;
use crate::envelope::{
    ENVELOPE_HEADER_SIZE, FrameKind, MAX_FRAME_SIZE, parse_envelope_header, wrap_envelope,
};
use crate::error::CodecError;
use crate::header::Header;

/// Write side of a muxrpc stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    codec: CodecType,
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W, codec: CodecType) -> Self {
        Self {
            inner,
            codec,
            buf: Vec::new(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the largest envelope payload this writer will send.
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.max_frame_size = limit;
        self
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    /// Write a header and an already-encoded body, then flush.
    ///
    /// Nothing is written if either envelope would exceed the frame limit.
    pub async fn write_frame(&mut self, header: &Header, body: &[u8]) -> Result<(), CodecError> {
        let header = self.codec.encode(header)?;
        self.check_size(header.len())?;
        self.check_size(body.len())?;

        self.buf.clear();
        wrap_envelope(FrameKind::Header, &header, &mut self.buf);
        wrap_envelope(FrameKind::Body, body, &mut self.buf);

        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Encode `body` with this stream's codec and write it after `header`.
    pub async fn write_message<T>(&mut self, header: &Header, body: &T) -> Result<(), CodecError>
    where
        T: Serialize + ?Sized,
    {
        let body = self.codec.encode(body)?;
        self.write_frame(header, &body).await
    }

    /// Flush and shut down the write direction.
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        // The length prefix is a u32, whatever limit was configured.
        let limit = self.max_frame_size.min(u32::MAX as usize);
        if size > limit {
            return Err(CodecError::FrameTooLarge { size, limit });
        }
        Ok(())
    }
}

/// Read side of a muxrpc stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    codec: CodecType,
    max_frame_size: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R, codec: CodecType) -> Self {
        Self {
            inner,
            codec,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the largest accepted envelope payload.
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.max_frame_size = limit;
        self
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    /// Read the next header.
    pub async fn read_header(&mut self) -> Result<Header, CodecError> {
        let payload = self.read_envelope(FrameKind::Header).await?;
        self.codec.decode(&payload)
    }

    /// Read the body that follows the last header, still encoded.
    pub async fn read_body(&mut self) -> Result<Bytes, CodecError> {
        self.read_envelope(FrameKind::Body).await
    }

    /// Read the body that follows the last header and decode it.
    pub async fn read_message<T>(&mut self) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let payload = self.read_body().await?;
        self.codec.decode(&payload)
    }

    /// Consume the body that follows the last header without decoding it.
    pub async fn discard_body(&mut self) -> Result<(), CodecError> {
        self.read_body().await.map(drop)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_envelope(&mut self, expected: FrameKind) -> Result<Bytes, CodecError> {
        let mut prefix = [0u8; ENVELOPE_HEADER_SIZE];
        self.inner.read_exact(&mut prefix).await?;

        let length = parse_envelope_header(&prefix, expected, self.max_frame_size)?;

        let mut payload = BytesMut::zeroed(length);
        self.inner.read_exact(&mut payload).await?;
        Ok(payload.freeze())
    }
}
