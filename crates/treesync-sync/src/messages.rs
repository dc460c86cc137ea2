//! Replication message types and their wire encoding.
//!
//! Two logical channels carry these messages:
//!
//! - the delta stream (producer to every subscriber) carries [`DeltaMessage`]
//! - the request channel (one subscriber to the producer) carries a
//!   [`SyncRequest`] answered by a [`SyncResponse`]
//!
//! All frames are CBOR. Documents inside frames use the canonical encoding.
//!
//! | Message | Encoding |
//! |---|---|
//! | delta | `[timestamp, delta-map]` |
//! | request | `"update"` or `"verify"` |
//! | update response | `[timestamp, document-map]` |
//! | verify response | `[timestamp, "<64 lowercase hex>"]` |

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use ciborium::value::Value;

use treesync_core::canonical::{
    decode_value, document_from_value, encode_array_header, encode_document, encode_text,
    encode_uint,
};
use treesync_core::{Checksum, Delta, Snapshot, StateChecksum, Timestamp};

use crate::error::{Result, SyncError};

/// Wire literal for the full-state request.
pub const UPDATE_COMMAND: &str = "update";
/// Wire literal for the checksum request.
pub const VERIFY_COMMAND: &str = "verify";

/// One incremental change as published on the delta stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMessage {
    /// Producer timestamp after the delta was applied.
    pub timestamp: Timestamp,
    /// The change itself.
    pub delta: Delta,
}

impl DeltaMessage {
    pub fn new(timestamp: Timestamp, delta: Delta) -> Self {
        Self { timestamp, delta }
    }

    /// Encode as `[timestamp, delta]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::new();
        encode_array_header(&mut buf, 2);
        encode_uint(&mut buf, 0, self.timestamp.as_u64());
        encode_document(&mut buf, &self.delta);
        Bytes::from(buf)
    }

    /// Decode a delta stream frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = decode_value(bytes)?;
        let (timestamp, body) = decode_pair(&value)?;
        let delta = document_from_value(body)?;
        Ok(Self { timestamp, delta })
    }
}

/// A request on the request/response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncRequest {
    /// "Give me your full state."
    Update,
    /// "Give me your checksum."
    Verify,
}

impl SyncRequest {
    /// The wire literal for this request.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncRequest::Update => UPDATE_COMMAND,
            SyncRequest::Verify => VERIFY_COMMAND,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::new();
        encode_text(&mut buf, self.as_str());
        Bytes::from(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match decode_value(bytes)? {
            Value::Text(s) => s.parse(),
            _ => Err(SyncError::InvalidMessage(
                "request must be a text literal".into(),
            )),
        }
    }
}

impl FromStr for SyncRequest {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            UPDATE_COMMAND => Ok(SyncRequest::Update),
            VERIFY_COMMAND => Ok(SyncRequest::Verify),
            other => Err(SyncError::InvalidMessage(format!(
                "unknown request {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer to a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResponse {
    /// Full state for an `update` request.
    Update(Snapshot),
    /// Stamped checksum for a `verify` request.
    Verify(StateChecksum),
}

impl SyncResponse {
    /// Which request this response answers.
    pub fn request(&self) -> SyncRequest {
        match self {
            SyncResponse::Update(_) => SyncRequest::Update,
            SyncResponse::Verify(_) => SyncRequest::Verify,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::new();
        encode_array_header(&mut buf, 2);
        match self {
            SyncResponse::Update(snapshot) => {
                encode_uint(&mut buf, 0, snapshot.timestamp.as_u64());
                encode_document(&mut buf, &snapshot.document);
            }
            SyncResponse::Verify(stamped) => {
                encode_uint(&mut buf, 0, stamped.timestamp.as_u64());
                encode_text(&mut buf, &stamped.checksum.to_hex());
            }
        }
        Bytes::from(buf)
    }

    /// Decode a response, checking it has the shape `expected` calls for.
    pub fn decode(bytes: &[u8], expected: SyncRequest) -> Result<Self> {
        let value = decode_value(bytes)?;
        let (timestamp, body) = decode_pair(&value)?;

        match expected {
            SyncRequest::Update => {
                let document = document_from_value(body)?;
                Ok(SyncResponse::Update(Snapshot::new(timestamp, document)))
            }
            SyncRequest::Verify => match body {
                Value::Text(hex) => {
                    let checksum = Checksum::from_hex(hex)?;
                    Ok(SyncResponse::Verify(StateChecksum::new(timestamp, checksum)))
                }
                _ => Err(SyncError::InvalidMessage(
                    "verify response must carry a hex digest".into(),
                )),
            },
        }
    }
}

/// Split a `[timestamp, body]` array.
fn decode_pair(value: &Value) -> Result<(Timestamp, &Value)> {
    let items = match value {
        Value::Array(items) if items.len() == 2 => items,
        _ => {
            return Err(SyncError::InvalidMessage(
                "expected a two-element array".into(),
            ))
        }
    };

    let timestamp = match &items[0] {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            u64::try_from(n).map_err(|_| {
                SyncError::InvalidMessage(format!("timestamp {} out of range", n))
            })?
        }
        _ => {
            return Err(SyncError::InvalidMessage(
                "timestamp must be an unsigned integer".into(),
            ))
        }
    };

    Ok((Timestamp::new(timestamp), &items[1]))
}
