//! Store trait: the abstract interface for the replicated document.
//!
//! This trait allows the producer and replica roles to be storage-agnostic.

use treesync_core::{Delta, Document, Snapshot, StateChecksum, Timestamp};

/// Result of applying a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The delta was merged and the store timestamp advanced.
    Applied,
    /// The delta's timestamp was not newer than the store; nothing changed.
    Stale {
        /// The store timestamp that rejected the delta.
        current: Timestamp,
    },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ApplyOutcome::Stale { .. })
    }
}

/// The Store trait: a nested document plus its logical timestamp.
///
/// Methods are synchronous. Store operations are critical sections that run
/// to completion; callers never suspend inside one.
///
/// # Design Notes
///
/// - **Monotonicity**: `apply_delta` only accepts timestamps strictly greater
///   than the current one. Replaying an already-applied delta is a no-op.
/// - **Reset**: `reset` replaces document and timestamp together and is the
///   only way to move the timestamp backwards.
/// - **Deep copies**: `snapshot` hands out an owned copy; mutating it never
///   touches the store.
pub trait Store: Send + Sync {
    /// Merge `delta` into the document and advance the timestamp.
    fn apply_delta(&self, timestamp: Timestamp, delta: &Delta) -> ApplyOutcome;

    /// Replace the entire document and timestamp atomically.
    fn reset(&self, document: Document, timestamp: Timestamp);

    /// An immutable copy of `(timestamp, document)`.
    fn snapshot(&self) -> Snapshot;

    /// The checksum of the current document, paired with its timestamp.
    fn checksum(&self) -> StateChecksum;

    /// The timestamp of the last applied change.
    fn timestamp(&self) -> Timestamp;
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn apply_delta(&self, timestamp: Timestamp, delta: &Delta) -> ApplyOutcome {
        (**self).apply_delta(timestamp, delta)
    }

    fn reset(&self, document: Document, timestamp: Timestamp) {
        (**self).reset(document, timestamp)
    }

    fn snapshot(&self) -> Snapshot {
        (**self).snapshot()
    }

    fn checksum(&self) -> StateChecksum {
        (**self).checksum()
    }

    fn timestamp(&self) -> Timestamp {
        (**self).timestamp()
    }
}
