//! The bounded FIFO send queue.
//!
//! Ported from `mg_rpc_queue_entry` / `STAILQ_HEAD(queue, ...)` in the
//! original; `VecDeque` is the direct idiomatic match for a singly-linked
//! tail queue (Design Notes: "the queue is FIFO so needs a tail pointer or
//! a deque").

use std::collections::VecDeque;

use crate::channel::ChannelId;

/// One deferred send. `pinned` mirrors the original's `qe->ci`: when set,
/// drain must use this exact channel rather than re-resolving by
/// destination (set for responses/errors, which already know their
/// channel; unset for outgoing calls resolved by destination).
pub struct QueueEntry {
    pub dst: String,
    pub frame: String,
    pub pinned: Option<ChannelId>,
}

/// Owning FIFO queue with an explicit bound, replacing the original's
/// `queue_len` counter plus `STAILQ` with a `VecDeque` whose `len()` is
/// always authoritative.
pub struct Queue {
    entries: VecDeque<QueueEntry>,
    max_len: usize,
}

impl Queue {
    pub fn new(max_len: usize) -> Self {
        Queue {
            entries: VecDeque::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry, enforcing the queue-bound invariant (spec §8.3).
    /// Returns `false` without appending if the queue is already full.
    pub fn push(&mut self, dst: String, frame: String, pinned: Option<ChannelId>) -> bool {
        if self.entries.len() >= self.max_len {
            return false;
        }
        self.entries.push_back(QueueEntry { dst, frame, pinned });
        true
    }

    /// Drops every entry pinned to `id` (spec §4.7, CLOSED on a
    /// non-persistent channel).
    pub fn purge_pinned_to(&mut self, id: ChannelId) {
        self.entries.retain(|e| e.pinned != Some(id));
    }

    /// Drains the queue in FIFO order, handing each entry to `send`. An
    /// entry is removed from the queue iff `send` returns `true`; entries
    /// that fail stay in place and the walk continues past them, matching
    /// `mg_rpc_process_queue`'s `STAILQ_FOREACH_SAFE` traversal.
    pub fn drain<F>(&mut self, mut send: F)
    where
        F: FnMut(&QueueEntry) -> bool,
    {
        let mut remaining = VecDeque::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_front() {
            if !send(&entry) {
                remaining.push_back(entry);
            }
        }
        self.entries = remaining;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_respects_max_len() {
        let mut q = Queue::new(2);
        assert!(q.push("a".into(), "{}".into(), None));
        assert!(q.push("b".into(), "{}".into(), None));
        assert!(!q.push("c".into(), "{}".into(), None));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn drain_keeps_failed_sends_in_order() {
        let mut q = Queue::new(10);
        q.push("a".into(), "1".into(), None);
        q.push("b".into(), "2".into(), None);
        q.push("c".into(), "3".into(), None);

        let mut sent = Vec::new();
        q.drain(|entry| {
            if entry.frame == "2" {
                return false;
            }
            sent.push(entry.frame.clone());
            true
        });

        assert_eq!(sent, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn purge_pinned_removes_only_matching_entries() {
        let mut q = Queue::new(10);
        q.push("a".into(), "1".into(), Some(ChannelId(0)));
        q.push("b".into(), "2".into(), Some(ChannelId(1)));
        q.purge_pinned_to(ChannelId(0));
        assert_eq!(q.len(), 1);
    }
}
