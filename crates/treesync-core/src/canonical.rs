//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for document
//! trees:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats, no nulls, text keys only
//!
//! The canonical encoding is critical: two documents with the same content
//! produce identical bytes (and thus identical checksums) no matter in which
//! order their keys were inserted or on which node they were built.

use ciborium::value::Value;

use crate::error::{CoreError, Result};
use crate::tree::{Document, Node, Scalar, Tree};

/// Decoder limits.
pub mod limits {
    /// Max nesting of internal nodes below the document root.
    pub const MAX_DEPTH: usize = 64;
}

/// Encode a document to canonical CBOR bytes.
pub fn canonical_bytes(document: &Document) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_document(&mut buf, document);
    buf
}

/// Append the canonical encoding of a document to `buf`.
pub fn encode_document(buf: &mut Vec<u8>, document: &Document) {
    encode_node(buf, document.root());
}

/// Append the canonical encoding of a subtree to `buf`.
pub fn encode_tree(buf: &mut Vec<u8>, tree: &Tree) {
    match tree {
        Tree::Leaf(scalar) => encode_scalar(buf, scalar),
        Tree::Node(node) => encode_node(buf, node),
    }
}

fn encode_scalar(buf: &mut Vec<u8>, scalar: &Scalar) {
    match scalar {
        Scalar::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Scalar::Int(i) => encode_integer(buf, *i),
        Scalar::Text(s) => encode_text(buf, s),
    }
}

/// Encode a node canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison, which for text keys
/// means shorter keys first, then bytewise.
fn encode_node(buf: &mut Vec<u8>, node: &Node) {
    let mut entries: Vec<(Vec<u8>, &Tree)> = node
        .iter()
        .map(|(key, value)| {
            let mut key_buf = Vec::with_capacity(key.len() + 1);
            encode_text(&mut key_buf, key);
            (key_buf, value)
        })
        .collect();

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, entries.len() as u64);
    for (key_bytes, value) in entries {
        buf.extend_from_slice(&key_bytes);
        encode_tree(buf, value);
    }
}

/// Encode a signed integer (major types 0 and 1).
pub fn encode_integer(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1i128 - i128::from(n)) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
pub fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a text string (major type 3).
pub fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Write the header of a definite-length array (major type 4).
pub fn encode_array_header(buf: &mut Vec<u8>, len: usize) {
    encode_uint(buf, 4, len as u64);
}

/// Parse exactly one CBOR item from `bytes`.
///
/// Trailing bytes after the item are rejected.
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let mut reader = bytes;
    let value: Value = ciborium::from_reader(&mut reader)
        .map_err(|e| CoreError::DecodingError(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CoreError::DecodingError(format!(
            "{} trailing bytes after CBOR item",
            reader.len()
        )));
    }
    Ok(value)
}

/// Decode a document from CBOR bytes.
///
/// Accepts any well-formed encoding of a document, canonical or not; the
/// decoded document re-encodes canonically.
pub fn decode_document(bytes: &[u8]) -> Result<Document> {
    let value = decode_value(bytes)?;
    document_from_value(&value)
}

/// Convert a CBOR value (map) into a document.
pub fn document_from_value(value: &Value) -> Result<Document> {
    match value {
        Value::Map(entries) => Ok(Document::from_node(node_from_entries(entries, 0)?)),
        _ => Err(CoreError::MalformedDocument("expected map at root".into())),
    }
}

fn node_from_entries(entries: &[(Value, Value)], depth: usize) -> Result<Node> {
    if depth > limits::MAX_DEPTH {
        return Err(CoreError::DepthExceeded {
            max: limits::MAX_DEPTH,
        });
    }

    let mut node = Node::new();
    for (key, value) in entries {
        let key = match key {
            Value::Text(s) => s.clone(),
            _ => return Err(CoreError::MalformedDocument("non-text map key".into())),
        };
        let tree = tree_from_value(value, depth)?;
        if node.insert(key.clone(), tree).is_some() {
            return Err(CoreError::MalformedDocument(format!(
                "duplicate key {:?}",
                key
            )));
        }
    }
    Ok(node)
}

fn tree_from_value(value: &Value, depth: usize) -> Result<Tree> {
    match value {
        Value::Map(entries) => Ok(Tree::Node(node_from_entries(entries, depth + 1)?)),
        Value::Text(s) => Ok(Tree::Leaf(Scalar::Text(s.clone()))),
        Value::Bool(b) => Ok(Tree::Leaf(Scalar::Bool(*b))),
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            let n = i64::try_from(n).map_err(|_| {
                CoreError::MalformedDocument(format!("integer {} out of range", n))
            })?;
            Ok(Tree::Leaf(Scalar::Int(n)))
        }
        Value::Float(_) => Err(CoreError::MalformedDocument(
            "floats are not valid leaf values".into(),
        )),
        Value::Null => Err(CoreError::MalformedDocument(
            "null is not a valid leaf value".into(),
        )),
        _ => Err(CoreError::MalformedDocument(
            "unsupported CBOR value type".into(),
        )),
    }
}
