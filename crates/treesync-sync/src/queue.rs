//! The replica queue: deltas received while the replica is not applying
//! them directly.

use std::collections::VecDeque;

use treesync_core::Timestamp;
use treesync_store::{ApplyOutcome, Store};

use crate::messages::DeltaMessage;

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries merged into the store.
    pub applied: usize,
    /// Entries at or below the store's timestamp, dropped unapplied.
    pub discarded: usize,
}

impl std::ops::AddAssign for DrainReport {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.discarded += other.discarded;
    }
}

/// FIFO of received deltas, kept in receipt order.
#[derive(Debug, Default)]
pub struct ReplicaQueue {
    entries: VecDeque<DeltaMessage>,
}

impl ReplicaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: DeltaMessage) {
        self.entries.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the oldest queued entry.
    pub fn front_timestamp(&self) -> Option<Timestamp> {
        self.entries.front().map(|m| m.timestamp)
    }

    /// Apply queued entries to `store` in receipt order.
    ///
    /// Each entry is checked against the store's timestamp at the moment it
    /// is applied, so anything already covered by the store is discarded.
    /// With a `bound`, draining stops at the first entry newer than it and
    /// leaves that entry and everything after it queued.
    pub fn drain_into<S: Store + ?Sized>(
        &mut self,
        store: &S,
        bound: Option<Timestamp>,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(front) = self.entries.front() {
            if bound.is_some_and(|b| front.timestamp > b) {
                break;
            }
            let Some(entry) = self.entries.pop_front() else {
                break;
            };

            match store.apply_delta(entry.timestamp, &entry.delta) {
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::Stale { current } => {
                    tracing::debug!(
                        entry = %entry.timestamp,
                        %current,
                        "discarding queued delta covered by current state"
                    );
                    report.discarded += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::Document;
    use treesync_store::MemoryStore;

    fn entry(t: u64, key: &str, value: &str) -> DeltaMessage {
        DeltaMessage::new(Timestamp::new(t), Document::new().with(&[key], value))
    }

    #[test]
    fn test_drain_discards_entries_at_or_below_baseline() {
        let store =
            MemoryStore::with_state(Document::new().with(&["a"], "base"), Timestamp::new(5));
        let mut queue = ReplicaQueue::new();
        queue.push(entry(4, "a", "old"));
        queue.push(entry(5, "a", "same"));
        queue.push(entry(6, "b", "new"));

        let report = queue.drain_into(&store, None);

        assert_eq!(report, DrainReport { applied: 1, discarded: 2 });
        assert!(queue.is_empty());

        let doc = store.snapshot().document;
        assert_eq!(doc.get_scalar(&["a"]), Some(&"base".into()));
        assert_eq!(doc.get_scalar(&["b"]), Some(&"new".into()));
        assert_eq!(store.timestamp(), Timestamp::new(6));
    }

    #[test]
    fn test_drain_stale_only_leaves_document_untouched() {
        let base = Document::new().with(&["a", "b"], "x");
        let store = MemoryStore::with_state(base.clone(), Timestamp::new(3));
        let mut queue = ReplicaQueue::new();
        queue.push(entry(1, "a", "clobber"));
        queue.push(entry(3, "z", "extra"));

        queue.drain_into(&store, None);

        assert_eq!(store.snapshot().document, base);
        assert_eq!(store.timestamp(), Timestamp::new(3));
    }

    #[test]
    fn test_drain_in_receipt_order() {
        let store = MemoryStore::new();
        let mut queue = ReplicaQueue::new();
        queue.push(entry(1, "k", "first"));
        queue.push(entry(2, "k", "second"));

        queue.drain_into(&store, None);

        assert_eq!(store.snapshot().document.get_scalar(&["k"]), Some(&"second".into()));
    }

    #[test]
    fn test_drain_stops_at_bound() {
        let store = MemoryStore::new();
        let mut queue = ReplicaQueue::new();
        queue.push(entry(1, "a", "1"));
        queue.push(entry(2, "b", "2"));
        queue.push(entry(3, "c", "3"));

        let report = queue.drain_into(&store, Some(Timestamp::new(2)));

        assert_eq!(report.applied, 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front_timestamp(), Some(Timestamp::new(3)));
        assert_eq!(store.timestamp(), Timestamp::new(2));
    }
}
