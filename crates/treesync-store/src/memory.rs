//! In-memory implementation of the Store trait.
//!
//! Document and timestamp live behind one `RwLock`, so each trait method is
//! a single atomic observation (readers) or mutation (writers).

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use treesync_core::{Checksum, Delta, Document, Snapshot, StateChecksum, Timestamp};

use crate::traits::{ApplyOutcome, Store};

/// In-memory document store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    document: Document,
    timestamp: Timestamp,
}

impl MemoryStore {
    /// Create an empty store at `Timestamp::ZERO`.
    pub fn new() -> Self {
        Self::with_state(Document::new(), Timestamp::ZERO)
    }

    /// Create a store holding `document` at `timestamp`.
    pub fn with_state(document: Document, timestamp: Timestamp) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                document,
                timestamp,
            }),
        }
    }

    // A panic mid-merge leaves a partially merged tree, which is still a
    // well-formed tree, so poisoning is not treated as fatal.
    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn apply_delta(&self, timestamp: Timestamp, delta: &Delta) -> ApplyOutcome {
        let mut inner = self.write();

        if timestamp <= inner.timestamp {
            tracing::trace!(
                incoming = %timestamp,
                current = %inner.timestamp,
                "skipping stale delta"
            );
            return ApplyOutcome::Stale {
                current: inner.timestamp,
            };
        }

        inner.document.merge(delta);
        inner.timestamp = timestamp;
        ApplyOutcome::Applied
    }

    fn reset(&self, document: Document, timestamp: Timestamp) {
        let mut inner = self.write();
        inner.document = document;
        inner.timestamp = timestamp;
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.read();
        Snapshot::new(inner.timestamp, inner.document.clone())
    }

    fn checksum(&self) -> StateChecksum {
        let inner = self.read();
        StateChecksum::new(inner.timestamp, Checksum::of(&inner.document))
    }

    fn timestamp(&self) -> Timestamp {
        self.read().timestamp
    }
}
