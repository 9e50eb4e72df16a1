//! The transport contract and the table of registered channel entries.
//!
//! Grounded on `transport/mod.rs`'s `Openable`/`Transport` traits for the
//! shape of "a small trait pluggable backends implement", and on
//! `mg_rpc_channel_info_internal` / the `SLIST(channels)` in the original
//! for the entry record and its invariants. The trait here is synchronous
//! (§5's concurrency model has no internal locks or worker threads), which
//! is the one deliberate divergence from the teacher's `async_trait`
//! transport layer.

use std::rc::Rc;

use crate::destination;

/// Capability set a pluggable transport backend implements. Every method
/// is synchronous and non-blocking: a transport that can't complete a
/// request immediately reports it later through
/// [`Multiplexer::handle_channel_event`](crate::mux::Multiplexer::handle_channel_event).
pub trait Channel {
    fn connect(&self);
    fn close(&self);
    fn destroy(&self);
    /// Attempts to hand `frame` to the transport. `true` means the
    /// transport accepted responsibility for it and will eventually
    /// report completion via a `FrameSent` event.
    fn send_frame(&self, frame: &[u8]) -> bool;
    fn channel_type(&self) -> &str;
    /// Descriptive, transport-supplied string (e.g. peer address). `None`
    /// if the transport has nothing to report.
    fn info(&self) -> Option<String>;
    /// Whether the entry should survive a `Closed` event instead of being
    /// torn down.
    fn is_persistent(&self) -> bool;
    /// Whether broadcast sends (`opts.broadcast`) should include this
    /// channel.
    fn is_broadcast_enabled(&self) -> bool;
}

/// Events a transport raises against the multiplexer. Named after the
/// original's `MG_RPC_CHANNEL_*` constants.
pub enum ChannelEvent<'a> {
    Open,
    /// A raw, not-yet-parsed frame.
    FrameRecd(&'a str),
    /// A frame the transport has already parsed (skips the codec).
    FrameRecdParsed(crate::frame::Frame<'a>),
    FrameSent { success: bool },
    Closed,
}

/// External collaborator that turns a resolved [`DialRequest`](crate::destination::DialRequest)
/// into a live channel, e.g. by opening a WebSocket connection. Dialing
/// itself is out of scope for this crate (spec §1); this is the narrow
/// seam an embedding application plugs into.
pub trait ChannelDialer {
    fn dial(&mut self, request: &crate::destination::DialRequest) -> Option<Rc<dyn Channel>>;
}

/// Opaque handle to a row in the channel table, returned by
/// [`Multiplexer::add_channel`](crate::mux::Multiplexer::add_channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) usize);

/// A registered channel entry: the transport handle plus the bookkeeping
/// the original stores inline on `mg_rpc_channel_info_internal`.
pub struct ChannelEntry {
    pub dst: String,
    pub channel: Rc<dyn Channel>,
    pub is_open: bool,
    pub is_busy: bool,
}

impl ChannelEntry {
    fn new(dst: String, channel: Rc<dyn Channel>) -> Self {
        ChannelEntry {
            dst,
            channel,
            is_open: false,
            is_busy: false,
        }
    }
}

/// Owning registry of channel entries, replacing the original's
/// `SLIST_HEAD(channels, ...)` with a plain `Vec` (Design Notes:
/// "intrusive singly-linked lists" -> "ordered sequences of owned
/// records").
#[derive(Default)]
pub struct ChannelTable {
    entries: Vec<Option<ChannelEntry>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        ChannelTable::default()
    }

    pub fn insert(&mut self, dst: String, channel: Rc<dyn Channel>) -> ChannelId {
        self.entries.push(Some(ChannelEntry::new(dst, channel)));
        ChannelId(self.entries.len() - 1)
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.entries.get(id.0).and_then(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelEntry> {
        self.entries.get_mut(id.0).and_then(|e| e.as_mut())
    }

    /// Finds the row holding this exact `Rc`, by pointer identity, mirroring
    /// the original's `ci->ch == ch` comparison in `mg_rpc_ev_handler`.
    pub fn find_by_channel(&self, channel: &Rc<dyn Channel>) -> Option<ChannelId> {
        self.entries.iter().enumerate().find_map(|(i, e)| {
            let e = e.as_ref()?;
            if Rc::ptr_eq(&e.channel, channel) {
                Some(ChannelId(i))
            } else {
                None
            }
        })
    }

    /// The first entry whose destination equals `dst` (spec §4.5 step 1's
    /// exact-match scan). Returns `None` for an empty `dst` -- an implied
    /// destination never exact-matches, it falls through to
    /// [`default_entry`](Self::default_entry).
    pub fn find_exact(&self, dst: &str) -> Option<ChannelId> {
        if dst.is_empty() {
            return None;
        }
        self.entries.iter().enumerate().find_map(|(i, e)| {
            let e = e.as_ref()?;
            if destination::destinations_equal(dst, &e.dst) {
                Some(ChannelId(i))
            } else {
                None
            }
        })
    }

    /// The entry registered under the reserved default-destination
    /// sentinel, if any.
    pub fn default_entry(&self) -> Option<ChannelId> {
        self.entries.iter().enumerate().find_map(|(i, e)| {
            let e = e.as_ref()?;
            if e.dst == crate::frame::DST_DEFAULT {
                Some(ChannelId(i))
            } else {
                None
            }
        })
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<ChannelEntry> {
        self.entries.get_mut(id.0).and_then(|e| e.take())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &ChannelEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (ChannelId(i), e)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChannelId, &mut ChannelEntry)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, e)| e.as_mut().map(|e| (ChannelId(i), e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct StubChannel {
        persistent: bool,
    }

    impl Channel for StubChannel {
        fn connect(&self) {}
        fn close(&self) {}
        fn destroy(&self) {}
        fn send_frame(&self, _frame: &[u8]) -> bool {
            true
        }
        fn channel_type(&self) -> &str {
            "stub"
        }
        fn info(&self) -> Option<String> {
            None
        }
        fn is_persistent(&self) -> bool {
            self.persistent
        }
        fn is_broadcast_enabled(&self) -> bool {
            false
        }
    }

    #[test]
    fn find_exact_matches_and_default_entry_is_separate() {
        let mut table = ChannelTable::new();
        table.insert(
            crate::frame::DST_DEFAULT.to_string(),
            Rc::new(StubChannel { persistent: true }),
        );
        table.insert("peer1".to_string(), Rc::new(StubChannel { persistent: true }));

        let found = table.find_exact("peer1");
        assert_eq!(table.get(found.unwrap()).unwrap().dst, "peer1");

        assert!(table.find_exact("unknown-peer").is_none());
        assert_eq!(
            table.get(table.default_entry().unwrap()).unwrap().dst,
            crate::frame::DST_DEFAULT
        );
    }

    #[test]
    fn remove_clears_the_slot() {
        let mut table = ChannelTable::new();
        let id = table.insert("peer1".to_string(), Rc::new(StubChannel { persistent: false }));
        assert!(table.remove(id).is_some());
        assert!(table.get(id).is_none());
    }
}
