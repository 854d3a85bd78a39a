//! Scripted server side for client integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use muxrpc_client::{BoxedTransport, Client, CodecType, Dialer, Header, Options};
use muxrpc_core::{FrameReader, FrameWriter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf,
};

pub const DUPLEX_BUFFER: usize = 64 * 1024;

/// The server end of one connection: reads requests, writes responses.
pub struct Peer<S> {
    pub options: Options,
    reader: FrameReader<ReadHalf<BufReader<S>>>,
    writer: FrameWriter<WriteHalf<BufReader<S>>>,
}

impl<S> Peer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the client's preamble and switch to its codec.
    pub async fn accept(stream: S) -> Peer<S> {
        let mut stream = BufReader::new(stream);
        let options = Options::read_preamble(&mut stream).await.unwrap();
        let (read_half, write_half) = tokio::io::split(stream);

        Peer {
            options,
            reader: FrameReader::new(read_half, options.codec_type()),
            writer: FrameWriter::new(write_half, options.codec_type()),
        }
    }

    /// Answer an HTTP CONNECT with `200 Connected to muxrpc`, then accept the
    /// RPC stream.
    pub async fn accept_http(stream: S) -> Peer<S> {
        let stream = answer_connect(stream, muxrpc_client::CONNECTED).await;
        Peer::accept(stream).await
    }

    /// Read the next request.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> (Header, T) {
        let header = self.reader.read_header().await.unwrap();
        let body = self.reader.read_message().await.unwrap();
        (header, body)
    }

    /// Read the next request header, or `None` once the client shut down.
    pub async fn try_recv_header(&mut self) -> Option<Header> {
        let header = self.reader.read_header().await.ok()?;
        self.reader.discard_body().await.ok()?;
        Some(header)
    }

    pub async fn reply<T: Serialize + ?Sized>(&mut self, request: &Header, body: &T) {
        self.writer.write_message(request, body).await.unwrap();
    }

    pub async fn reply_error(&mut self, request: &Header, error: &str) {
        let mut header = request.clone();
        header.error = error.to_string();
        self.writer.write_message(&header, &()).await.unwrap();
    }
}

/// Read a CONNECT request and answer it with `status`.
///
/// The client sends nothing more until it has the answer, so no buffered
/// bytes are lost by unwrapping the reader.
pub async fn answer_connect<S>(stream: S, status: &str) -> S
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    assert_eq!(line, "CONNECT /_muxrpc_ HTTP/1.0\n");
    line.clear();
    stream.read_line(&mut line).await.unwrap();
    assert_eq!(line, "\n");

    let mut stream = stream.into_inner();
    stream
        .write_all(format!("HTTP/1.0 {status}\r\n\r\n").as_bytes())
        .await
        .unwrap();
    stream
}

/// A connected client and its scripted peer over an in-memory pipe.
pub async fn connect(codec: CodecType) -> (Client, Peer<DuplexStream>) {
    connect_with_buffer(codec, DUPLEX_BUFFER).await
}

/// Like [`connect`], with a pipe that holds at most `buffer` unread bytes per
/// direction. Writes stall once a peer that is not reading lets it fill up.
pub async fn connect_with_buffer(codec: CodecType, buffer: usize) -> (Client, Peer<DuplexStream>) {
    let (client_end, server_end) = tokio::io::duplex(buffer);
    let options = Options::new().codec(codec);

    let (client, peer) = tokio::join!(Client::handshake(client_end, options), Peer::accept(server_end));
    (client.unwrap(), peer)
}

/// Dialer that hands out queued in-memory streams and records what was asked
/// for.
#[derive(Clone, Default)]
pub struct MemoryDialer {
    streams: Arc<Mutex<VecDeque<DuplexStream>>>,
    pub dialed: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryDialer {
    /// Queue a stream and return the server end.
    pub fn push(&self) -> DuplexStream {
        let (client_end, server_end) = tokio::io::duplex(DUPLEX_BUFFER);
        self.streams.lock().unwrap().push_back(client_end);
        server_end
    }

    pub fn dialed(&self) -> Vec<(String, String)> {
        self.dialed.lock().unwrap().clone()
    }
}

impl Dialer for MemoryDialer {
    fn dial<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, io::Result<BoxedTransport>> {
        self.dialed
            .lock()
            .unwrap()
            .push((network.to_string(), address.to_string()));
        let stream = self.streams.lock().unwrap().pop_front();

        Box::pin(async move {
            stream
                .map(|s| Box::new(s) as BoxedTransport)
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
