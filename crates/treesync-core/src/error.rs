//! Error types for treesync core.

use thiserror::Error;

/// Errors that can occur while decoding documents or digests.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("document nesting exceeds maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
