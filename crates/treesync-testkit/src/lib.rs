//! # treesync Testkit
//!
//! Testing utilities for treesync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Documents with their expected canonical bytes and checksums
//! - **Generators**: Proptest strategies for documents, deltas and timestamps
//! - **Fixtures**: A producer serving a memory network, plus replicas on demand
//!
//! ## Golden Vectors
//!
//! ```rust
//! use treesync_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, checksum) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, checksum);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use treesync_testkit::generators::{delta, document};
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_idempotent(base in document(), delta in delta()) {
//!         let mut once = base.clone();
//!         once.merge(&delta);
//!         let mut twice = once.clone();
//!         twice.merge(&delta);
//!         prop_assert_eq!(once, twice);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use treesync_testkit::fixtures::{fast_sync_config, item_delta, ReplicationFixture};
//!
//! # async fn example() {
//! let fixture = ReplicationFixture::new();
//! let (replica, _ingest) = fixture.replica_with_ingest(fast_sync_config());
//! fixture.producer.apply_change(item_delta("k", "v"));
//! replica.resync().await.unwrap();
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    fast_sync_config, item_delta, wait_until, ReplicationFixture, TestProducer, TestReplica,
};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
