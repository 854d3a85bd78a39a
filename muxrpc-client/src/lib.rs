//! Multiplexing client for the muxrpc protocol.
//!
//! One [`Client`] owns one connection and lets any number of tasks issue calls
//! over it at once. Requests carry a sequence number. Responses may come back
//! in any order and are routed to the caller that is waiting for them.
//!
//! ## Features
//!
//! - Concurrent calls over a single connection
//! - Blocking-style [`Client::call`] and queue-based [`Client::go`]
//! - Cancellation with any future ([`Client::invoke`]) or a deadline
//!   ([`Client::call_timeout`])
//! - TCP, Unix sockets, HTTP CONNECT tunnelling, or any custom [`Dialer`]
//! - JSON and postcard payload codecs
//!
//! ## Example
//!
//! ```ignore
//! use muxrpc_client::{Options, xdial};
//!
//! let client = xdial("tcp@127.0.0.1:9999", Options::new()).await?;
//!
//! let reply: String = client.call("Echo.Upper", "hello").await?;
//! assert_eq!(reply, "HELLO");
//! ```
//!
//! ## Async Calls
//!
//! [`Client::go`] returns as soon as the request is on the wire. The finished
//! [`Call`] lands on a completion queue, which may be shared between calls:
//!
//! ```ignore
//! use muxrpc_client::completion_queue;
//!
//! let (done, mut finished) = completion_queue::<i64>(16)?;
//! for i in 0..5 {
//!     client.go("Foo.Square", &i, Some(done.clone())).await;
//! }
//! drop(done);
//!
//! while let Some(call) = finished.recv().await {
//!     println!("seq {:?}: {:?}", call.seq, call.into_result());
//! }
//! ```
//!
//! ## Cancellation
//!
//! [`Client::invoke`] takes any `Future<Output = ()>` as a cancellation signal.
//! The call is abandoned when the future resolves first:
//!
//! ```ignore
//! use tokio::sync::oneshot;
//!
//! let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
//! let reply = client
//!     .invoke(async { let _ = cancel_rx.await; }, "Foo.Slow", &())
//!     .await;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `tracing` (default) | Spans for RPC calls, connection lifecycle events | `tracing` |
//!
//! When enabled, each call creates an `rpc.call` span with:
//! - `rpc.method`: target in `"Service.Method"` form
//! - `rpc.encoding`: codec name
//! - `rpc.seq`: sequence number, once assigned
//! - `otel.kind`: "client"

mod builder;
mod call;
mod client;
mod dial;
mod error;
mod registry;
pub mod transport;
mod tunnel;

pub use builder::ClientBuilder;
pub use call::{
    AsyncCall, Call, Completion, CompletionReceiver, DEFAULT_COMPLETION_CAPACITY,
    completion_queue,
};
pub use client::Client;
pub use dial::{dial, dial_http, dial_http_with, dial_with, xdial, xdial_with};
pub use error::ClientError;
pub use transport::{BoxedTransport, Dialer, NetDialer, Transport};
pub use tunnel::{CONNECTED, DEFAULT_RPC_PATH};

// Re-export core types that users need
pub use muxrpc_core::{CodecType, DEFAULT_CONNECT_TIMEOUT, Header, MAGIC_NUMBER, Options};

pub use bytes::Bytes;
