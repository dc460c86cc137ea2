//! # treesync
//!
//! Replicate a nested key-value document from one authoritative producer
//! to any number of read-only replicas.
//!
//! ## Overview
//!
//! - **Delta stream**: every change the producer commits is published as
//!   `(timestamp, delta)` to all replicas, in commit order.
//! - **Resync**: a replica fetches the producer's full state, resets to it,
//!   and replays only the queued deltas newer than that snapshot.
//! - **Verify**: a replica compares its checksum with the producer's; a
//!   mismatch is a fatal divergence that needs a fresh resync.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use treesync::{NodeConfig, ProducerNode, ReplicaNode};
//! use treesync::core::Document;
//! use treesync::store::MemoryStore;
//! use treesync::sync::MemoryNetwork;
//!
//! async fn example() -> treesync::Result<()> {
//!     let config = NodeConfig::default();
//!     let network = MemoryNetwork::new();
//!
//!     let producer = Arc::new(config.producer(MemoryStore::new()));
//!     producer.register(network.delta_sink());
//!     let (changes, source) = mpsc::channel(16);
//!     let listener = network.listener().unwrap();
//!     let _producer_node = ProducerNode::start(producer, listener, source);
//!
//!     let (stream, channel) = network.connect_subscriber();
//!     let replica = Arc::new(config.replica(MemoryStore::new(), channel));
//!     let replica_node = ReplicaNode::start(replica, stream);
//!
//!     changes.send(Document::new().with(&["a", "b"], "x")).await.unwrap();
//!
//!     // Resolves only on a fatal fault such as divergence.
//!     replica_node.wait().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `treesync::core` - Document tree, canonical encoding, checksums
//! - `treesync::store` - Store trait and in-memory store
//! - `treesync::sync` - Producer, replica, messages and transports

pub mod error;
pub mod node;

// Re-export component crates
pub use treesync_core as core;
pub use treesync_store as store;
pub use treesync_sync as sync;

pub use error::{NodeError, Result};
pub use node::{NodeConfig, ProducerNode, ReplicaNode};

// Re-export commonly used types
pub use treesync_core::{
    Checksum, Delta, Document, Scalar, Snapshot, StateChecksum, Timestamp, Tree,
};
pub use treesync_store::{MemoryStore, Store};
pub use treesync_sync::{
    Producer, ProducerConfig, Replica, ReplicaPhase, SyncConfig, SyncError, VerifyOutcome,
};
