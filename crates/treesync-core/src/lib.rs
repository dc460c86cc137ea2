//! # treesync Core
//!
//! Pure primitives for treesync: the replicated document tree, delta merge,
//! canonical encoding, checksums and logical timestamps.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over nested key-value trees.
//!
//! ## Key Types
//!
//! - [`Document`] - The replicated nested key-value tree (also used as [`Delta`])
//! - [`Tree`] - A node in the tree: either a [`Scalar`] leaf or a mapping
//! - [`Timestamp`] - Totally ordered logical clock value
//! - [`Checksum`] - Blake3 digest of a document's canonical encoding
//! - [`Snapshot`] / [`StateChecksum`] - Values always paired with their timestamp
//!
//! ## Canonicalization
//!
//! Documents are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod tree;
pub mod types;

pub use canonical::{canonical_bytes, decode_document};
pub use crypto::Checksum;
pub use error::{CoreError, Result};
pub use tree::{Delta, Document, Node, Scalar, Tree};
pub use types::{Snapshot, StateChecksum, Timestamp};
