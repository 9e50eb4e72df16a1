//! Table of outstanding outgoing requests awaiting a response.
//!
//! Ported from `mg_rpc_sent_request_info` / `SLIST_HEAD(requests, ...)`.
//! The original's `mg_result_cb_t cb` + `void *cb_arg` pair collapses into
//! a single boxed closure here, since a Rust closure already carries its
//! own captured state.

use serde_json::value::RawValue;

/// Invoked once, from [`Multiplexer::handle_channel_event`](crate::mux::Multiplexer::handle_channel_event)
/// when a matching response arrives, with the borrowed result span, the
/// error code (0 if none) and the borrowed error message span.
pub type ResultCallback = Box<dyn FnMut(Option<&RawValue>, i64, Option<&str>)>;

struct PendingRequest {
    id: i64,
    cb: ResultCallback,
}

/// Owning table of pending requests, replacing the original's
/// `SLIST_HEAD(requests, mg_rpc_sent_request_info)` with a `Vec`.
#[derive(Default)]
pub struct PendingTable {
    entries: Vec<PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable::default()
    }

    pub fn register(&mut self, id: i64, cb: ResultCallback) {
        self.entries.push(PendingRequest { id, cb });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds and unlinks the pending request matching `id`, invoking its
    /// callback. Returns `true` iff a match was found, matching
    /// `mg_rpc_handle_response`'s "silently drop if we didn't send this"
    /// behaviour for the caller.
    pub fn complete(&mut self, id: i64, result: Option<&RawValue>, error_code: i64, error_msg: Option<&str>) -> bool {
        let pos = match self.entries.iter().position(|r| r.id == id) {
            Some(pos) => pos,
            None => return false,
        };
        let mut req = self.entries.remove(pos);
        (req.cb)(result, error_code, error_msg);
        true
    }
}
