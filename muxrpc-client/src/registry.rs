//! Pending-call registry.
//!
//! Owns the sequence counter and the map of calls awaiting a response, plus the
//! two lifecycle flags: `closing` (set by the user) and `shutdown` (set when
//! the connection fails). All state sits behind one mutex so a call is never
//! registered after [`Registry::terminate_all`] has drained the map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ClientError;
use crate::call::{Outcome, PendingCall};

#[derive(Default)]
struct State {
    seq: u64,
    pending: HashMap<u64, Box<dyn PendingCall>>,
    closing: bool,
    shutdown: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<State>,
}

/// A call refused by [`Registry::register`], handed back with the reason.
pub(crate) type Refused = (Box<dyn PendingCall>, ClientError);

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign the next sequence number and store the call.
    ///
    /// Refused with [`ClientError::Shutdown`] once the client is closing or
    /// the connection has failed.
    pub(crate) fn register(&self, mut call: Box<dyn PendingCall>) -> Result<u64, Refused> {
        let mut state = self.lock();
        if state.closing || state.shutdown {
            return Err((call, ClientError::Shutdown));
        }

        let seq = state.seq;
        state.seq += 1;
        call.set_seq(seq);
        state.pending.insert(seq, call);
        Ok(seq)
    }

    /// Detach the call registered under `seq`, if any.
    pub(crate) fn remove(&self, seq: u64) -> Option<Box<dyn PendingCall>> {
        self.lock().pending.remove(&seq)
    }

    /// Mark the connection as shut down and fail every pending call with
    /// `cause`. Returns how many calls were failed.
    pub(crate) fn terminate_all(&self, cause: &ClientError) -> usize {
        let mut state = self.lock();
        state.shutdown = true;

        let count = state.pending.len();
        for (_, call) in state.pending.drain() {
            call.complete(Outcome::Failed(cause.clone()));
        }
        count
    }

    /// Set the closing flag. Fails with [`ClientError::Shutdown`] if it was
    /// already set.
    pub(crate) fn begin_close(&self) -> Result<(), ClientError> {
        let mut state = self.lock();
        if state.closing {
            return Err(ClientError::Shutdown);
        }
        state.closing = true;
        Ok(())
    }

    pub(crate) fn is_available(&self) -> bool {
        let state = self.lock();
        !state.closing && !state.shutdown
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}
