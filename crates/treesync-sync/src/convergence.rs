//! Convergence verification between a replica and the producer.
//!
//! Both sides reduce their document to a [`StateChecksum`]; equal digests
//! mean equal documents.

use treesync_core::StateChecksum;

/// Result of comparing a local and a remote checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both documents are identical.
    Converged,
    /// The documents differ.
    Diverged {
        local: StateChecksum,
        remote: StateChecksum,
    },
}

impl ConvergenceResult {
    /// Check if the nodes have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }

    pub fn is_diverged(&self) -> bool {
        matches!(self, ConvergenceResult::Diverged { .. })
    }
}

/// Compare a replica's checksum against the producer's.
///
/// The caller is expected to have brought the replica to the remote
/// timestamp first. Matching digests at different timestamps still count as
/// converged (a delta that changed nothing), but are logged.
pub fn compare(local: &StateChecksum, remote: &StateChecksum) -> ConvergenceResult {
    if local.checksum != remote.checksum {
        return ConvergenceResult::Diverged {
            local: *local,
            remote: *remote,
        };
    }

    if local.timestamp != remote.timestamp {
        tracing::warn!(
            local = %local.timestamp,
            remote = %remote.timestamp,
            "digests match at different timestamps"
        );
    }

    ConvergenceResult::Converged
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::{Checksum, Document, Timestamp};

    fn stamped(t: u64, doc: &Document) -> StateChecksum {
        StateChecksum::new(Timestamp::new(t), Checksum::of(doc))
    }

    #[test]
    fn test_identical_documents_converge() {
        let doc = Document::new().with(&["a", "b"], "x");
        let result = compare(&stamped(1, &doc), &stamped(1, &doc));
        assert!(result.is_converged());
    }

    #[test]
    fn test_one_leaf_difference_diverges() {
        let local = stamped(4, &Document::new().with(&["a", "b"], "x"));
        let remote = stamped(4, &Document::new().with(&["a", "b"], "y"));

        assert_eq!(
            compare(&local, &remote),
            ConvergenceResult::Diverged { local, remote }
        );
    }

    #[test]
    fn test_same_digest_different_timestamp_converges() {
        let doc = Document::new().with(&["k"], 1);
        assert!(compare(&stamped(2, &doc), &stamped(3, &doc)).is_converged());
    }
}
