//! Participant-side protocol errors.

/// Fatal conditions a participant's message handlers can raise.
#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    /// A handler received a ring message of the wrong kind for the
    /// phase the participant is in (e.g. `on_instruction` before
    /// `on_information`).
    #[error("expected a {expected} message, got {actual}")]
    UnexpectedMessage {
        /// The kind expected.
        expected: &'static str,
        /// The kind actually received.
        actual: &'static str,
    },

    /// A handler that requires a prior `on_information` call was invoked
    /// before one arrived.
    #[error("no active request: on_information has not been called yet")]
    NoActiveRequest,

    /// The coordinator-supplied QID hierarchy failed `check_consistency`.
    #[error("QID hierarchy inconsistent: {0}")]
    Hierarchy(#[from] tips_hierarchy::HierarchyError),

    /// The tree structure rejected a refinement or lookup.
    #[error("TIPS tree error: {0}")]
    Tree(#[from] tips_tree::TreeError),

    /// Sealing a result row under the coordinator's public key failed.
    #[error("row sealing failed: {0}")]
    Crypto(#[from] tips_crypto::CryptoError),
}

/// Result alias for participant operations.
pub type Result<T> = std::result::Result<T, ParticipantError>;
