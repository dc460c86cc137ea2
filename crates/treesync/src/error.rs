//! Error types for running treesync nodes.

use thiserror::Error;
use tokio::task::JoinError;
use treesync_sync::SyncError;

/// Errors surfaced by a running node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Replication protocol error, including a detected divergence.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A node task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] JoinError),
}

impl NodeError {
    /// Whether this is a confirmed divergence from the producer.
    pub fn is_divergence(&self) -> bool {
        matches!(self, NodeError::Sync(SyncError::Diverged { .. }))
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
