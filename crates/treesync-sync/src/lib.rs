//! # treesync Sync
//!
//! Replication protocol: one producer streams deltas to any number of
//! replicas, which resync from a full snapshot and verify themselves against
//! the producer's checksum.
//!
//! ## Overview
//!
//! - The [`Producer`] applies changes to its store and publishes every
//!   committed delta, in commit order, through its [`Publisher`].
//! - A [`Replica`] applies streamed deltas while active and queues them while
//!   a resync or verification is in flight, so no delta is lost.
//! - Resync replaces the replica's state with the producer's snapshot and
//!   replays only the queued deltas newer than it.
//! - Verify compares digests; a mismatch is a fatal divergence, never retried
//!   silently.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use treesync_core::Document;
//! use treesync_store::MemoryStore;
//! use treesync_sync::{MemoryNetwork, Producer, ProducerConfig, Replica, SyncConfig};
//!
//! async fn example() -> treesync_sync::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let producer = Arc::new(Producer::new(MemoryStore::new(), ProducerConfig::default()));
//!     producer.register(network.delta_sink());
//!
//!     let (_stream, channel) = network.connect_subscriber();
//!     let replica = Replica::new(MemoryStore::new(), channel, SyncConfig::default());
//!
//!     producer.apply_change(Document::new().with(&["a", "b"], "x"));
//!     replica.resync().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Producer                            Replica
//!   |-------- [t, delta] ------------->|   (continuous)
//!   |<------- "update" ----------------|
//!   |-------- [t, document] ---------->|
//!   |<------- "verify" ----------------|
//!   |-------- [t, hex digest] -------->|
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod producer;
pub mod publisher;
pub mod queue;
pub mod replica;
pub mod transport;

pub use convergence::{compare, ConvergenceResult};
pub use error::{Result, SyncError};
pub use messages::{DeltaMessage, SyncRequest, SyncResponse, UPDATE_COMMAND, VERIFY_COMMAND};
pub use producer::{ClockMode, Producer, ProducerConfig};
pub use publisher::{DeltaHandler, HandlerId, Publisher};
pub use queue::{DrainReport, ReplicaQueue};
pub use replica::{
    IngestOutcome, Replica, ReplicaPhase, ResyncReport, SyncConfig, VerifyOutcome,
};
pub use transport::memory::{
    MemoryDeltaSink, MemoryDeltaStream, MemoryNetwork, MemoryRequestChannel,
    MemoryRequestListener,
};
pub use transport::{DeltaStream, IncomingRequest, RequestChannel, RequestListener};
