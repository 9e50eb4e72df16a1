//! Shared test harness: a synchronous loopback `Channel` that records
//! every frame handed to it instead of delivering it anywhere, mirroring
//! `minidsp/tests/test_utils/mod.rs`'s `TestDevice` but without the
//! async plumbing this crate's concurrency model doesn't need.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rpc_mux::Channel;

pub struct LoopbackChannel {
    pub sent: RefCell<Vec<String>>,
    pub close_requested: Cell<bool>,
    persistent: bool,
    broadcast: bool,
}

impl LoopbackChannel {
    pub fn new() -> Rc<Self> {
        Self::with(true, false)
    }

    pub fn non_persistent() -> Rc<Self> {
        Self::with(false, false)
    }

    pub fn broadcast_enabled() -> Rc<Self> {
        Self::with(true, true)
    }

    fn with(persistent: bool, broadcast: bool) -> Rc<Self> {
        Rc::new(LoopbackChannel {
            sent: RefCell::new(Vec::new()),
            close_requested: Cell::new(false),
            persistent,
            broadcast,
        })
    }
}

impl Channel for LoopbackChannel {
    fn connect(&self) {}

    fn close(&self) {
        self.close_requested.set(true);
    }

    fn destroy(&self) {}

    fn send_frame(&self, frame: &[u8]) -> bool {
        self.sent.borrow_mut().push(String::from_utf8_lossy(frame).into_owned());
        true
    }

    fn channel_type(&self) -> &str {
        "loopback"
    }

    fn info(&self) -> Option<String> {
        Some("loopback".to_string())
    }

    fn is_persistent(&self) -> bool {
        self.persistent
    }

    fn is_broadcast_enabled(&self) -> bool {
        self.broadcast
    }
}
