use serde::{Deserialize, Serialize};

/// Per-message header, sent in its own envelope ahead of every body.
///
/// Requests and responses share the layout. On a response, a non-empty
/// `error` means the server failed the call and the body carries no reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    /// Sequence number chosen by the client, echoed by the server.
    pub seq: u64,
    /// Remote error text; empty on success.
    pub error: String,
}

impl Header {
    /// Build a request header.
    pub fn new<S: Into<String>>(service_method: S, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Overwrite this header for a new request, reusing its allocations.
    pub fn reset(&mut self, service_method: &str, seq: u64) {
        self.service_method.clear();
        self.service_method.push_str(service_method);
        self.seq = seq;
        self.error.clear();
    }

    /// Returns true if the server reported an error.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
