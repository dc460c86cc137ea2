//! Golden vectors for the canonical encoding, the checksum and the wire
//! frames.
//!
//! Any node producing different bytes for these inputs cannot verify
//! against one that matches them.

use treesync::core::canonical_bytes;
use treesync::sync::{DeltaMessage, SyncRequest, SyncResponse};
use treesync::{Checksum, Document, Snapshot, StateChecksum, Timestamp};
use treesync_testkit::vectors::all_vectors;

#[test]
fn canonical_bytes_match_vectors() {
    for vector in all_vectors() {
        let document = vector.document();
        assert_eq!(
            hex::encode(canonical_bytes(&document)),
            vector.canonical_hex,
            "vector '{}'",
            vector.name
        );
    }
}

#[test]
fn checksums_match_vectors() {
    for vector in all_vectors() {
        let checksum = Checksum::of(&vector.document());
        assert_eq!(checksum.to_hex(), vector.checksum_hex, "vector '{}'", vector.name);
        assert_eq!(checksum.to_hex().len(), 64);
    }
}

#[test]
fn checksum_ignores_merge_history() {
    // Built in one go.
    let direct: Document =
        serde_json::from_value(serde_json::json!({"a": {"b": "x", "c": "y"}})).unwrap();

    // Built from two deltas, second one first.
    let mut merged = Document::new();
    merged.merge(&Document::new().with(&["a", "c"], "y"));
    merged.merge(&Document::new().with(&["a", "b"], "x"));

    assert_eq!(Checksum::of(&direct), Checksum::of(&merged));
    assert_eq!(
        Checksum::of(&merged).to_hex(),
        "5449b515754e7e0fd29cdba548c4e9321b7aab7c8ff174ba464ae4dc97924634"
    );
}

#[test]
fn delta_frame_bytes() {
    let message = DeltaMessage::new(Timestamp::new(2), Document::new().with(&["a", "c"], "y"));
    assert_eq!(hex::encode(message.encode()), "8202a16161a161636179");
}

#[test]
fn request_frame_bytes() {
    assert_eq!(hex::encode(SyncRequest::Update.encode()), "66757064617465");
    assert_eq!(hex::encode(SyncRequest::Verify.encode()), "66766572696679");
}

#[test]
fn response_frame_bytes() {
    let document = Document::new().with(&["a", "b"], "x");

    let update = SyncResponse::Update(Snapshot::new(Timestamp::new(1), document.clone()));
    assert_eq!(hex::encode(update.encode()), "8201a16161a161626178");

    let verify = SyncResponse::Verify(StateChecksum::new(
        Timestamp::new(1),
        Checksum::of(&document),
    ));
    let expected = format!(
        "82017840{}",
        hex::encode("92020163a88a1c0f70db22edeef00376a979cc2052df0ccda97a5f4a0f99f805")
    );
    assert_eq!(hex::encode(verify.encode()), expected);
}
