//! The producer role: the single authoritative writer.
//!
//! A producer applies changes to its store, publishes each committed delta
//! with its post-apply timestamp, and answers `update` and `verify` requests
//! from replicas.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc;

use treesync_core::{Delta, Snapshot, StateChecksum, Timestamp};
use treesync_store::{ApplyOutcome, Store};

use crate::error::{Result, SyncError};
use crate::messages::{DeltaMessage, SyncRequest, SyncResponse};
use crate::publisher::{DeltaHandler, HandlerId, Publisher};
use crate::transport::RequestListener;

/// How the producer allocates timestamps for new deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClockMode {
    /// One more than the store's current timestamp.
    #[default]
    Logical,
    /// Unix milliseconds, bumped when needed to stay strictly increasing.
    WallClock,
}

/// Configuration for the producer.
#[derive(Debug, Clone, Default)]
pub struct ProducerConfig {
    pub clock: ClockMode,
}

/// The authoritative node.
pub struct Producer<S: Store> {
    store: S,
    publisher: Publisher,
    config: ProducerConfig,
    /// Serialises apply + publish so subscribers see commit order.
    commit: Mutex<()>,
}

impl<S: Store> Producer<S> {
    pub fn new(store: S, config: ProducerConfig) -> Self {
        Self {
            store,
            publisher: Publisher::new(),
            config,
            commit: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Register a handler for committed deltas.
    pub fn register(&self, handler: impl DeltaHandler + 'static) -> HandlerId {
        self.publisher.register(handler)
    }

    pub fn unregister(&self, id: HandlerId) -> bool {
        self.publisher.unregister(id)
    }

    /// Apply a change and publish it.
    ///
    /// Returns the timestamp the change was committed at.
    pub fn apply_change(&self, delta: Delta) -> Timestamp {
        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.store.timestamp();
        let timestamp = self.next_timestamp(current);

        match self.store.apply_delta(timestamp, &delta) {
            ApplyOutcome::Applied => {}
            ApplyOutcome::Stale { current } => {
                // Only reachable if the clock saturated.
                tracing::warn!(%timestamp, %current, "change not applied, clock exhausted");
                return current;
            }
        }

        tracing::debug!(%timestamp, leaves = delta.leaf_count(), "change committed");
        self.publisher.notify_all(&DeltaMessage::new(timestamp, delta));
        timestamp
    }

    /// Apply every change from `changes` until the source closes.
    pub async fn publish_loop(&self, mut changes: mpsc::Receiver<Delta>) {
        while let Some(delta) = changes.recv().await {
            self.apply_change(delta);
        }
        tracing::info!(timestamp = %self.store.timestamp(), "change source closed");
    }

    /// Answer a replica request.
    pub fn handle_request(&self, request: SyncRequest) -> SyncResponse {
        match request {
            SyncRequest::Update => SyncResponse::Update(self.snapshot()),
            SyncRequest::Verify => SyncResponse::Verify(self.checksum()),
        }
    }

    /// Decode a request frame and encode the response.
    pub fn handle_frame(&self, frame: &[u8]) -> Result<Bytes> {
        let request = SyncRequest::decode(frame)?;
        tracing::debug!(%request, "answering request");
        Ok(self.handle_request(request).encode())
    }

    /// Answer requests until the listener closes.
    ///
    /// Malformed requests are logged and dropped unanswered.
    pub async fn serve<L: RequestListener + ?Sized>(&self, listener: &L) -> Result<()> {
        loop {
            let incoming = match listener.accept().await {
                Ok(incoming) => incoming,
                Err(SyncError::ChannelClosed) => {
                    tracing::info!("request listener closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match self.handle_frame(incoming.frame()) {
                Ok(response) => {
                    if incoming.respond(response).is_err() {
                        tracing::debug!("requester went away before the response");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping malformed request"),
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn checksum(&self) -> StateChecksum {
        self.store.checksum()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.store.timestamp()
    }

    fn next_timestamp(&self, current: Timestamp) -> Timestamp {
        match self.config.clock {
            ClockMode::Logical => current.next(),
            ClockMode::WallClock => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                    .unwrap_or(0);
                Timestamp::new(now).max(current.next())
            }
        }
    }
}
