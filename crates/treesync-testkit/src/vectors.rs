//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encoding and the checksum, so that any
//! two nodes (or implementations) agree on the digest of a document.

use treesync_core::{canonical_bytes, Checksum, Document};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The document, as JSON.
    pub json: &'static str,
    /// Expected canonical CBOR encoding (hex).
    pub canonical_hex: &'static str,
    /// Expected checksum (hex).
    pub checksum_hex: &'static str,
}

impl GoldenVector {
    /// Parse the vector's document.
    pub fn document(&self) -> Document {
        match serde_json::from_str(self.json) {
            Ok(document) => document,
            Err(e) => panic!("vector '{}' has invalid JSON: {}", self.name, e),
        }
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "empty document",
            json: r#"{}"#,
            canonical_hex: "a0",
            checksum_hex: "1f94cbf313b3ce23257a7251ea0fc95a24556ea611e4f8f475e549971baedb02",
        },
        GoldenVector {
            name: "single nested leaf",
            json: r#"{"a": {"b": "x"}}"#,
            canonical_hex: "a16161a161626178",
            checksum_hex: "92020163a88a1c0f70db22edeef00376a979cc2052df0ccda97a5f4a0f99f805",
        },
        GoldenVector {
            name: "sibling added by a second delta",
            json: r#"{"a": {"c": "y", "b": "x"}}"#,
            canonical_hex: "a16161a26162617861636179",
            checksum_hex: "5449b515754e7e0fd29cdba548c4e9321b7aab7c8ff174ba464ae4dc97924634",
        },
        GoldenVector {
            name: "shorter keys sort first",
            json: r#"{"aa": 1, "b": 2}"#,
            canonical_hex: "a261620262616101",
            checksum_hex: "783ee181fb4d3778c9cd9ac3ef00b7abe0d2445e6270be351f626fcd0de98546",
        },
        GoldenVector {
            name: "mixed scalar types",
            json: r#"{"flag": true, "big": 1000000, "n": -500}"#,
            canonical_hex: "a3616e3901f3636269671a000f424064666c6167f5",
            checksum_hex: "2372729bf968e95b54f932f43d0081be963608feff6eecb9d6570a357e648df1",
        },
    ]
}

/// Check every vector against this build.
///
/// Returns `(name, matches, actual checksum hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let document = v.document();
            let bytes = hex::encode(canonical_bytes(&document));
            let checksum = Checksum::of(&document).to_hex();

            let matches = bytes == v.canonical_hex && checksum == v.checksum_hex;
            (v.name.to_string(), matches, checksum)
        })
        .collect()
}
