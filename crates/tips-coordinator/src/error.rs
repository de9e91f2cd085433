//! Coordinator-side protocol errors.

/// Fatal conditions the coordinator state machine can raise.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A QID hierarchy failed `check_consistency` at request start.
    #[error("QID hierarchy inconsistent: {0}")]
    Hierarchy(#[from] tips_hierarchy::HierarchyError),

    /// The party roster named fewer than two parties (the protocol needs
    /// at least one participant besides the coordinator).
    #[error("request requires more than one party, got {party_count}")]
    TooFewParties {
        /// The roster size actually supplied.
        party_count: usize,
    },

    /// The roster's non-coordinator ids were not `1, 2, 3, ...` in order.
    #[error("party ids must be ascending starting at 1")]
    NonAscendingPartyIds,

    /// A method was called while the coordinator was in the wrong state
    /// (e.g. `start_round` before `complete_round` resolved a
    /// refinement).
    #[error("expected coordinator state {expected}, was in {actual}")]
    WrongState {
        /// The state the call required.
        expected: &'static str,
        /// The state the coordinator was actually in.
        actual: &'static str,
    },

    /// `start_round` was called with no pending refinement decided.
    #[error("no refinement pending; the tree has already converged")]
    NoRefinementPending,

    /// The tree structure rejected a refinement or lookup.
    #[error("TIPS tree error: {0}")]
    Tree(#[from] tips_tree::TreeError),

    /// The `>k` oracle failed to evaluate a round.
    #[error("oracle error: {0}")]
    Oracle(#[from] tips_oracle::OracleError),

    /// A collected row failed to decrypt under the coordinator's key.
    #[error("row decryption failed: {0}")]
    Crypto(#[from] tips_crypto::CryptoError),
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
