//! # treesync Store
//!
//! Storage abstraction for treesync. Provides a trait-based interface for
//! the document store shared by the producer and replica roles.
//!
//! ## Overview
//!
//! The [`Store`] trait holds a nested key-value document together with the
//! logical timestamp of its last change. [`MemoryStore`] keeps both behind a
//! single lock so every operation is one atomic observation or mutation.
//!
//! ## Key Types
//!
//! - [`Store`] - The trait for all document store operations
//! - [`MemoryStore`] - Lock-protected in-memory implementation
//! - [`ApplyOutcome`] - Result of applying a delta
//!
//! ## Usage
//!
//! ```rust
//! use treesync_core::{Document, Timestamp};
//! use treesync_store::{ApplyOutcome, MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let delta = Document::new().with(&["a", "b"], "x");
//!
//! assert_eq!(store.apply_delta(Timestamp::new(1), &delta), ApplyOutcome::Applied);
//! assert!(store.apply_delta(Timestamp::new(1), &delta).is_stale());
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.timestamp, Timestamp::new(1));
//! ```
//!
//! ## Design Notes
//!
//! - **Monotonic timestamps**: A delta at or below the current timestamp is
//!   reported as `Stale` and not merged
//! - **No errors**: Store operations are pure data operations and never fail
//! - **Atomic reads**: `snapshot` and `checksum` never observe a torn state

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{ApplyOutcome, Store};
