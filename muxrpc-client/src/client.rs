//! The multiplexing client.
//!
//! A [`Client`] owns one connection. Any number of tasks may issue calls on it
//! concurrently. Requests are written one frame at a time under a write lock,
//! and a single dispatch task reads responses and routes each one back to its
//! caller by sequence number.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use muxrpc_core::{CodecType, FrameReader, FrameWriter, Header, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

#[cfg(feature = "tracing")]
use tracing::Instrument;

use crate::call::{
    self, AsyncCall, Call, Completion, DEFAULT_COMPLETION_CAPACITY, Entry, Outcome, PendingCall,
};
use crate::registry::Registry;
use crate::transport::{BoxedTransport, Transport};
use crate::{ClientBuilder, ClientError};

/// A connection to a muxrpc server.
///
/// Cloning is cheap and every clone shares the connection. The connection is
/// torn down on [`close`](Client::close), on the first read failure, or when
/// the last clone is dropped. Pending calls then fail.
///
/// # Example
///
/// ```ignore
/// use muxrpc_client::{Client, Options};
///
/// let client = muxrpc_client::dial("tcp", "127.0.0.1:9999", Options::new()).await?;
///
/// let sum: i64 = client.call("Foo.Sum", &(1, 2)).await?;
/// assert_eq!(sum, 3);
///
/// client.close().await?;
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    _guard: Arc<CloseOnDrop>,
}

struct Shared {
    codec: CodecType,
    options: Options,
    registry: Registry,
    sending: Mutex<Sending>,
    closed: Notify,
    /// Set once the connection is going away. An in-flight write gives up
    /// with this error so teardown never waits on a peer that stopped reading.
    abort: watch::Sender<Option<ClientError>>,
}

/// State only touched while holding the write lock.
struct Sending {
    writer: FrameWriter<WriteHalf<BoxedTransport>>,
    header: Header,
}

/// Stops the dispatch task once the last [`Client`] clone is gone.
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.closed.notify_one();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("codec", &self.shared.codec)
            .field("available", &self.is_available())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl Client {
    /// Start configuring a client for a compound address such as
    /// `tcp@127.0.0.1:9999` or `http@127.0.0.1:7001`.
    pub fn builder(rpc_addr: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(rpc_addr)
    }

    /// Run the handshake on an already-open transport.
    ///
    /// Writes the options preamble and starts the dispatch task. No timeout is
    /// applied here; see [`dial_with`](crate::dial_with) for the bounded form.
    pub async fn handshake<T: Transport>(transport: T, options: Options) -> Result<Client, ClientError> {
        let mut transport: BoxedTransport = Box::new(transport);
        options.write_preamble(&mut transport).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(codec = %options.codec_type(), "handshake written");

        Ok(Client::new(transport, options))
    }

    fn new(transport: BoxedTransport, options: Options) -> Client {
        let codec = options.codec_type();
        let (read_half, write_half) = tokio::io::split(transport);

        let shared = Arc::new(Shared {
            codec,
            options,
            registry: Registry::new(),
            sending: Mutex::new(Sending {
                writer: FrameWriter::new(write_half, codec),
                header: Header::default(),
            }),
            closed: Notify::new(),
            abort: watch::Sender::new(None),
        });

        tokio::spawn(receive(shared.clone(), FrameReader::new(read_half, codec)));

        Client {
            _guard: Arc::new(CloseOnDrop(shared.clone())),
            shared,
        }
    }

    /// The options this connection was opened with.
    pub fn options(&self) -> &Options {
        &self.shared.options
    }

    pub fn codec(&self) -> CodecType {
        self.shared.codec
    }

    /// Returns true until the client is closed or the connection fails.
    pub fn is_available(&self) -> bool {
        self.shared.registry.is_available()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.pending_len()
    }

    /// Submit a call without waiting for its reply.
    ///
    /// The finished [`Call`] is pushed onto `done`. When `done` is `None`, a
    /// queue of capacity [`DEFAULT_COMPLETION_CAPACITY`] is created and its
    /// receiver is returned in the [`AsyncCall`].
    ///
    /// Returns once the request has been written, or refused. A refused call
    /// is still delivered to the queue, carrying its error.
    pub async fn go<Req, Res>(
        &self,
        service_method: &str,
        args: &Req,
        done: Option<Completion<Res>>,
    ) -> AsyncCall<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        let (done, receiver) = match done {
            Some(done) => (done, None),
            None => {
                let (done, receiver) = call::bounded(DEFAULT_COMPLETION_CAPACITY);
                (done, Some(receiver))
            }
        };

        let seq = match self.submit(service_method, args, done) {
            Some(sending) => sending.await.ok().flatten(),
            None => None,
        };

        AsyncCall::new(seq, receiver)
    }

    /// Encode the arguments and start the register-then-write step.
    ///
    /// The step runs on its own task so a caller that gives up mid-write
    /// cannot leave half a frame on the wire. Returns `None` if encoding
    /// failed; the failed call is already on `done`.
    fn submit<Req, Res>(
        &self,
        service_method: &str,
        args: &Req,
        done: Completion<Res>,
    ) -> Option<JoinHandle<Option<u64>>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        let args = match self.shared.codec.encode(args) {
            Ok(args) => args,
            Err(err) => {
                let mut call = Call::new(service_method, Bytes::new());
                call.error = Some(err.into());
                done.deliver(call);
                return None;
            }
        };

        let entry = Box::new(Entry::new(
            Call::new(service_method, args.clone()),
            self.shared.codec,
            done,
        ));

        let shared = self.shared.clone();
        let method = service_method.to_string();
        Some(tokio::spawn(async move {
            shared.send(method, args, entry).await
        }))
    }

    /// Call `service_method` and wait for the reply, giving up when `cancel`
    /// resolves.
    ///
    /// A cancelled call is removed from the connection and returns
    /// [`ClientError::Canceled`]. If its response arrives later it is read and
    /// dropped.
    pub async fn invoke<Req, Res, F>(
        &self,
        cancel: F,
        service_method: &str,
        args: &Req,
    ) -> Result<Res, ClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
        F: Future<Output = ()>,
    {
        let fut = self.invoke_inner(cancel, service_method, args);

        #[cfg(feature = "tracing")]
        let fut = fut.instrument(tracing::info_span!(
            "rpc.call",
            rpc.method = %service_method,
            rpc.encoding = %self.shared.codec,
            rpc.seq = tracing::field::Empty,
            otel.kind = "client",
        ));

        fut.await
    }

    async fn invoke_inner<Req, Res, F>(
        &self,
        cancel: F,
        service_method: &str,
        args: &Req,
    ) -> Result<Res, ClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
        F: Future<Output = ()>,
    {
        let (done, mut finished) = call::bounded(1);
        let mut cancel = std::pin::pin!(cancel);

        let sent = match self.submit(service_method, args, done) {
            Some(mut sending) => {
                let sent = tokio::select! {
                    biased;
                    sent = &mut sending => Some(sent.ok().flatten()),
                    () = &mut cancel => None,
                };
                match sent {
                    Some(sent) => sent,
                    None => {
                        // Still waiting on the write lock or the write itself.
                        // Let the write finish, then drop the call.
                        let shared = self.shared.clone();
                        tokio::spawn(async move {
                            if let Ok(Some(seq)) = sending.await {
                                shared.cancel(seq);
                            }
                        });
                        return Err(ClientError::Canceled);
                    }
                }
            }
            None => None,
        };

        let Some(seq) = sent else {
            // Refused before registration; the failed call is already queued.
            return finished
                .recv()
                .await
                .map_or(Err(ClientError::Shutdown), Call::into_result);
        };

        #[cfg(feature = "tracing")]
        tracing::Span::current().record("rpc.seq", seq);

        tokio::select! {
            biased;
            finished_call = finished.recv() => {
                finished_call.map_or(Err(ClientError::Shutdown), Call::into_result)
            }
            () = &mut cancel => {
                self.cancel(seq);
                Err(ClientError::Canceled)
            }
        }
    }

    /// Call `service_method` and wait for the reply.
    pub async fn call<Req, Res>(&self, service_method: &str, args: &Req) -> Result<Res, ClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        self.invoke(std::future::pending(), service_method, args).await
    }

    /// Call `service_method`, failing with [`ClientError::Timeout`] if no reply
    /// arrives within `timeout`.
    pub async fn call_timeout<Req, Res>(
        &self,
        timeout: Duration,
        service_method: &str,
        args: &Req,
    ) -> Result<Res, ClientError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        match self
            .invoke(tokio::time::sleep(timeout), service_method, args)
            .await
        {
            Err(ClientError::Canceled) => Err(ClientError::Timeout(timeout)),
            result => result,
        }
    }

    /// Abandon the pending call `seq`, completing it with
    /// [`ClientError::Canceled`].
    ///
    /// Returns false if the call already finished.
    pub fn cancel(&self, seq: u64) -> bool {
        self.shared.cancel(seq)
    }

    /// Close the connection.
    ///
    /// New calls are refused right away and pending calls fail with
    /// [`ClientError::Shutdown`], including one whose request is still being
    /// written. Closing twice fails with [`ClientError::Shutdown`].
    pub async fn close(&self) -> Result<(), ClientError> {
        self.shared.registry.begin_close()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("closing client");

        self.shared.abort_writes(ClientError::Shutdown);
        self.shared.closed.notify_one();

        let mut sending = self.shared.sending.lock().await;
        sending.writer.shutdown().await?;
        Ok(())
    }
}

impl Shared {
    fn cancel(&self, seq: u64) -> bool {
        match self.registry.remove(seq) {
            Some(entry) => {
                entry.complete(Outcome::Failed(ClientError::Canceled));
                true
            }
            None => false,
        }
    }

    /// Make current and future writes give up with `cause`. The first cause
    /// wins.
    fn abort_writes(&self, cause: ClientError) {
        self.abort.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        });
    }

    async fn aborted(&self) -> ClientError {
        let mut abort = self.abort.subscribe();
        abort
            .wait_for(Option::is_some)
            .await
            .map(|cause| (*cause).clone())
            .ok()
            .flatten()
            .unwrap_or(ClientError::Shutdown)
    }

    /// Register the call and write its request. Returns the sequence number,
    /// or `None` if registration was refused.
    async fn send(
        &self,
        service_method: String,
        args: Bytes,
        entry: Box<dyn PendingCall>,
    ) -> Option<u64> {
        let mut sending = self.sending.lock().await;

        let seq = match self.registry.register(entry) {
            Ok(seq) => seq,
            Err((entry, err)) => {
                entry.complete(Outcome::Failed(err));
                return None;
            }
        };

        let Sending { writer, header } = &mut *sending;
        header.reset(&service_method, seq);

        let written = tokio::select! {
            biased;
            cause = self.aborted() => Err(cause),
            result = writer.write_frame(header, &args) => result.map_err(ClientError::from),
        };

        if let Err(err) = written {
            #[cfg(feature = "tracing")]
            tracing::debug!(seq, error = %err, "request write failed");

            // Absent if the dispatch task already terminated it.
            if let Some(entry) = self.registry.remove(seq) {
                entry.complete(Outcome::Failed(err));
            }
        }

        Some(seq)
    }
}

/// Dispatch task: route responses to pending calls until the stream fails or
/// the client is closed, then fail whatever is still pending.
async fn receive(shared: Arc<Shared>, mut reader: FrameReader<ReadHalf<BoxedTransport>>) {
    let cause: ClientError = loop {
        let header = tokio::select! {
            biased;
            () = shared.closed.notified() => break ClientError::Shutdown,
            header = reader.read_header() => match header {
                Ok(header) => header,
                Err(err) => break err.into(),
            },
        };

        let Some(entry) = shared.registry.remove(header.seq) else {
            // Cancelled, or failed locally after a partial write.
            #[cfg(feature = "tracing")]
            tracing::debug!(seq = header.seq, "discarding response with no pending call");

            match reader.discard_body().await {
                Ok(()) => continue,
                Err(err) => break err.into(),
            }
        };

        let body = match reader.read_body().await {
            Ok(body) => body,
            Err(err) => {
                let err = ClientError::from(err);
                entry.complete(Outcome::Failed(err.clone()));
                break err;
            }
        };

        if header.is_error() {
            entry.complete(Outcome::Failed(ClientError::Remote(header.error)));
        } else {
            entry.complete(Outcome::Reply(body));
        }
    };

    shared.abort_writes(cause.clone());
    let _sending = shared.sending.lock().await;
    let _terminated = shared.registry.terminate_all(&cause);

    #[cfg(feature = "tracing")]
    if _terminated > 0 {
        tracing::warn!(pending = _terminated, error = %cause, "connection ended with calls in flight");
    } else {
        tracing::debug!(error = %cause, "connection ended");
    }
}
