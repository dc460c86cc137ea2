//! Document checksums.
//!
//! A checksum is the Blake3 digest of a document's canonical encoding,
//! rendered on the wire as 64 lowercase hex characters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::canonical_bytes;
use crate::error::CoreError;
use crate::tree::Document;

/// A 32-byte Blake3 digest of a canonically encoded document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 64;

    /// Compute the checksum of a document.
    pub fn of(document: &Document) -> Self {
        Self::hash(&canonical_bytes(document))
    }

    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != Self::HEX_LEN {
            return Err(CoreError::InvalidChecksum(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidChecksum(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Checksum {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
