//! Strong type definitions for treesync.
//!
//! Timestamps are newtypes so they cannot be confused with counts or
//! lengths, and checksums and snapshots always travel with the timestamp
//! they were taken at.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Checksum;
use crate::tree::Document;

/// A totally ordered logical timestamp.
///
/// Attached to the state of a store and to every delta. A store's timestamp
/// only moves forward through delta application; only a full reset may
/// move it to an arbitrary value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The initial timestamp of an empty store.
    pub const ZERO: Self = Self(0);

    /// Create from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The smallest timestamp strictly greater than this one.
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A self-consistent copy of a store: the document and the timestamp it
/// was observed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub document: Document,
}

impl Snapshot {
    pub fn new(timestamp: Timestamp, document: Document) -> Self {
        Self {
            timestamp,
            document,
        }
    }

    /// Checksum of the snapshot, paired with its timestamp.
    pub fn checksum(&self) -> StateChecksum {
        StateChecksum {
            timestamp: self.timestamp,
            checksum: Checksum::of(&self.document),
        }
    }
}

/// A document digest paired with the timestamp at which it was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateChecksum {
    pub timestamp: Timestamp,
    pub checksum: Checksum,
}

impl StateChecksum {
    pub fn new(timestamp: Timestamp, checksum: Checksum) -> Self {
        Self {
            timestamp,
            checksum,
        }
    }
}

impl fmt::Display for StateChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.checksum.to_hex(), self.timestamp)
    }
}
