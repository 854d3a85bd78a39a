//! Calls and their completion queues.
//!
//! A [`Call`] is one request/response exchange. When it finishes, the engine
//! pushes the finished `Call` onto its completion queue exactly once. Many calls
//! may share one queue; see [`completion_queue`].

use bytes::Bytes;
use muxrpc_core::CodecType;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::ClientError;

/// Queue capacity used when [`Client::go`](crate::Client::go) is given no queue.
pub const DEFAULT_COMPLETION_CAPACITY: usize = 10;

/// A finished (or in-flight) request/response exchange.
#[derive(Debug)]
pub struct Call<Res> {
    /// Sequence number assigned by the client. `None` if the call was refused
    /// before it could be registered.
    pub seq: Option<u64>,
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    /// Encoded arguments, as written to the wire.
    pub args: Bytes,
    /// Decoded reply, set on success.
    pub reply: Option<Res>,
    /// Set when the call failed locally, remotely, or with the connection.
    pub error: Option<ClientError>,
}

impl<Res> Call<Res> {
    pub(crate) fn new(service_method: &str, args: Bytes) -> Self {
        Self {
            seq: None,
            service_method: service_method.to_string(),
            args,
            reply: None,
            error: None,
        }
    }

    /// Returns true if the call completed with a reply.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.reply.is_some()
    }

    /// Convert the finished call into its outcome.
    pub fn into_result(self) -> Result<Res, ClientError> {
        match (self.error, self.reply) {
            (Some(err), _) => Err(err),
            (None, Some(reply)) => Ok(reply),
            (None, None) => Err(ClientError::Protocol(format!(
                "call {:?} completed without a reply",
                self.seq
            ))),
        }
    }
}

/// Sending side of a completion queue.
///
/// Cloneable, so one queue can collect the results of many calls.
#[derive(Debug)]
pub struct Completion<Res> {
    tx: mpsc::Sender<Call<Res>>,
}

impl<Res> Clone for Completion<Res> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Receiving side of a completion queue.
#[derive(Debug)]
pub struct CompletionReceiver<Res> {
    rx: mpsc::Receiver<Call<Res>>,
}

/// Create a completion queue holding up to `capacity` finished calls.
///
/// A zero capacity could never hand a result over without the engine waiting
/// on the caller, so it is rejected with [`ClientError::Config`].
///
/// Size the queue for the calls sharing it. A result that finds the queue full
/// parks a task until the consumer makes room, so a queue that is never
/// drained keeps those tasks alive.
///
/// # Example
///
/// ```ignore
/// let (done, mut finished) = completion_queue::<String>(4)?;
/// client.go("Echo.Upper", "a", Some(done.clone())).await;
/// client.go("Echo.Upper", "b", Some(done)).await;
///
/// while let Some(call) = finished.recv().await {
///     println!("{:?} -> {:?}", call.seq, call.into_result());
/// }
/// ```
pub fn completion_queue<Res>(
    capacity: usize,
) -> Result<(Completion<Res>, CompletionReceiver<Res>), ClientError> {
    if capacity == 0 {
        return Err(ClientError::Config(
            "completion queue must have a capacity of at least 1".into(),
        ));
    }
    Ok(bounded(capacity))
}

pub(crate) fn bounded<Res>(capacity: usize) -> (Completion<Res>, CompletionReceiver<Res>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Completion { tx }, CompletionReceiver { rx })
}

impl<Res> Completion<Res> {
    /// The queue's capacity.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl<Res: Send + 'static> Completion<Res> {
    /// Hand a finished call to the queue without blocking the caller.
    ///
    /// A full queue is waited on from a separate task so the dispatch loop
    /// never stalls behind a slow consumer.
    pub(crate) fn deliver(&self, call: Call<Res>) {
        match self.tx.try_send(call) {
            Ok(()) => {}
            Err(TrySendError::Full(call)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(seq = ?call.seq, "completion queue full, deferring delivery");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(call).await;
                });
            }
            Err(TrySendError::Closed(_call)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(seq = ?_call.seq, "completion receiver dropped, discarding call");
            }
        }
    }
}

impl<Res> CompletionReceiver<Res> {
    /// Wait for the next finished call.
    ///
    /// Returns `None` once every [`Completion`] handle is gone and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<Call<Res>> {
        self.rx.recv().await
    }

    /// Take a finished call if one is already queued.
    pub fn try_recv(&mut self) -> Option<Call<Res>> {
        self.rx.try_recv().ok()
    }
}

/// Handle returned by [`Client::go`](crate::Client::go).
#[derive(Debug)]
pub struct AsyncCall<Res> {
    seq: Option<u64>,
    receiver: Option<CompletionReceiver<Res>>,
}

impl<Res> AsyncCall<Res> {
    pub(crate) fn new(seq: Option<u64>, receiver: Option<CompletionReceiver<Res>>) -> Self {
        Self { seq, receiver }
    }

    /// The sequence number assigned to the call, or `None` if it was refused
    /// before registration (its failed completion is already queued).
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    /// The queue created for this call when none was supplied.
    pub fn into_receiver(self) -> Option<CompletionReceiver<Res>> {
        self.receiver
    }

    /// Wait on the queue created for this call.
    ///
    /// Returns `None` when the call was submitted with a caller-supplied queue.
    pub async fn done(self) -> Option<Call<Res>> {
        self.receiver?.recv().await
    }
}

/// How a registered call ended.
pub(crate) enum Outcome {
    /// The encoded reply body.
    Reply(Bytes),
    Failed(ClientError),
}

/// A registered call with its reply type erased, as held by the registry.
pub(crate) trait PendingCall: Send {
    fn set_seq(&mut self, seq: u64);

    /// Finish the call and signal its queue. Consumes the entry, so a call
    /// cannot complete twice.
    fn complete(self: Box<Self>, outcome: Outcome);
}

pub(crate) struct Entry<Res> {
    call: Call<Res>,
    codec: CodecType,
    done: Completion<Res>,
}

impl<Res> Entry<Res> {
    pub(crate) fn new(call: Call<Res>, codec: CodecType, done: Completion<Res>) -> Self {
        Self { call, codec, done }
    }
}

impl<Res> PendingCall for Entry<Res>
where
    Res: DeserializeOwned + Send + 'static,
{
    fn set_seq(&mut self, seq: u64) {
        self.call.seq = Some(seq);
    }

    fn complete(self: Box<Self>, outcome: Outcome) {
        let Entry {
            mut call,
            codec,
            done,
        } = *self;

        match outcome {
            Outcome::Reply(body) => match codec.decode::<Res>(&body) {
                Ok(reply) => call.reply = Some(reply),
                Err(err) => call.error = Some(err.into()),
            },
            Outcome::Failed(err) => call.error = Some(err),
        }

        done.deliver(call);
    }
}
