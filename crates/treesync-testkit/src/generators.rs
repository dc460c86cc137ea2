//! Proptest generators for property-based testing.

use proptest::prelude::*;

use treesync_core::{Delta, Document, Node, Scalar, Timestamp, Tree};

/// Generate a key from a small alphabet, so generated deltas often touch
/// paths the document already has.
pub fn key() -> impl Strategy<Value = String> {
    "[a-d]{1,2}".prop_map(String::from)
}

/// Generate a leaf value.
pub fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::Int),
        "[a-z0-9 ]{0,8}".prop_map(Scalar::Text),
    ]
}

/// Generate a subtree up to four levels deep.
pub fn tree() -> impl Strategy<Value = Tree> {
    scalar().prop_map(Tree::Leaf).prop_recursive(4, 48, 4, |inner| {
        prop::collection::btree_map(key(), inner, 0..4).prop_map(Tree::Node)
    })
}

fn node() -> impl Strategy<Value = Node> {
    prop::collection::btree_map(key(), tree(), 0..5)
}

/// Generate a document.
pub fn document() -> impl Strategy<Value = Document> {
    node().prop_map(Document::from_node)
}

/// Generate a delta. Same shape as a document.
pub fn delta() -> impl Strategy<Value = Delta> {
    document()
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0u64..=1_000_000).prop_map(Timestamp::new)
}

/// Generate a sequence of changes for a producer to apply.
pub fn change_log(max_len: usize) -> impl Strategy<Value = Vec<Delta>> {
    prop::collection::vec(delta(), 0..=max_len)
}

/// Leaf paths of `delta` as owned strings.
pub fn leaf_paths(delta: &Delta) -> Vec<Vec<String>> {
    delta.leaves().into_iter().map(|(path, _)| path).collect()
}

/// Whether `path` or any of its prefixes is a leaf path in `delta`.
///
/// Such paths may be overwritten by merging `delta`; all others must not be.
pub fn touched_by(delta: &Delta, path: &[String]) -> bool {
    leaf_paths(delta).iter().any(|leaf| {
        let shared = leaf.len().min(path.len());
        leaf[..shared] == path[..shared]
    })
}

/// Borrow a path of owned segments as `&str`s.
pub fn as_path(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::{canonical_bytes, decode_document, Checksum};
    use treesync_store::{MemoryStore, Store};

    proptest! {
        #[test]
        fn test_merge_writes_every_delta_leaf(base in document(), delta in delta()) {
            let mut merged = base;
            merged.merge(&delta);

            for (path, value) in delta.leaves() {
                prop_assert_eq!(merged.get_scalar(&as_path(&path)), Some(value));
            }
        }

        #[test]
        fn test_merge_leaves_untouched_paths_alone(base in document(), delta in delta()) {
            let mut merged = base.clone();
            merged.merge(&delta);

            for (path, value) in base.leaves() {
                if !touched_by(&delta, &path) {
                    prop_assert_eq!(merged.get_scalar(&as_path(&path)), Some(value));
                }
            }
        }

        #[test]
        fn test_checksum_ignores_construction_order(doc in document()) {
            let leaves = doc.leaves();

            let mut forward = Document::new();
            for (path, value) in &leaves {
                forward.insert(&as_path(path), (*value).clone());
            }
            let mut backward = Document::new();
            for (path, value) in leaves.iter().rev() {
                backward.insert(&as_path(path), (*value).clone());
            }

            prop_assert_eq!(Checksum::of(&forward), Checksum::of(&backward));
        }

        #[test]
        fn test_idempotent_overwrite(base in document(), delta in delta(), t in 1u64..1000) {
            let once = MemoryStore::with_state(base.clone(), Timestamp::ZERO);
            once.apply_delta(Timestamp::new(t), &delta);

            let twice = MemoryStore::with_state(base, Timestamp::ZERO);
            twice.apply_delta(Timestamp::new(t), &delta);
            twice.apply_delta(Timestamp::new(t), &delta);

            prop_assert_eq!(once.snapshot(), twice.snapshot());
        }

        #[test]
        fn test_merge_is_idempotent_without_store(base in document(), delta in delta()) {
            let mut once = base.clone();
            once.merge(&delta);
            let mut twice = once.clone();
            twice.merge(&delta);

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn test_reset_leaves_no_residue(before in document(), after in document(), t in timestamp()) {
            let store = MemoryStore::with_state(before, Timestamp::new(7));
            store.reset(after.clone(), t);

            let stamped = store.checksum();
            prop_assert_eq!(stamped.timestamp, t);
            prop_assert_eq!(stamped.checksum, Checksum::of(&after));
        }

        #[test]
        fn test_canonical_decode_roundtrip(doc in document()) {
            let bytes = canonical_bytes(&doc);
            let decoded = decode_document(&bytes).unwrap();
            prop_assert_eq!(canonical_bytes(&decoded), bytes);
        }
    }
}
