//! Error types for the sync module.

use thiserror::Error;

use treesync_core::{CoreError, StateChecksum};

use crate::replica::ReplicaPhase;

/// Errors that can occur during replication.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be decoded or had the wrong shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Timeout waiting for the peer or for in-flight deltas.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The channel was closed by the other side.
    #[error("channel closed")]
    ChannelClosed,

    /// Another lifecycle operation is in progress on this replica.
    #[error("replica busy: {phase:?}")]
    Busy { phase: ReplicaPhase },

    /// Verification proved the replica differs from the producer.
    #[error("replica diverged: local {local}, remote {remote}")]
    Diverged {
        local: StateChecksum,
        remote: StateChecksum,
    },

    /// Core decoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Whether the operation may succeed if simply tried again.
    ///
    /// Transport faults are recoverable. A divergence is never retried; the
    /// only recovery is a fresh resync.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransportError(_)
                | SyncError::Timeout(_)
                | SyncError::InvalidMessage(_)
                | SyncError::Core(_)
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
