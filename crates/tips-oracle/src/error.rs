//! Oracle evaluation errors.

/// Errors raised while evaluating a `>k` oracle round.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    /// Two parties' contribution lists disagreed on the round's group
    /// shape (different number of groups, or a group naming an id one
    /// party doesn't share) — the round state diverged between parties.
    #[error("party contributions disagree on group shape at group {group_index}")]
    ShapeMismatch {
        /// Index of the first mismatched group.
        group_index: usize,
    },

    /// No parties contributed anything for this round.
    #[error("no party contributions supplied")]
    NoContributions,

    /// The remote MPC backend integration is not implemented.
    #[error("remote oracle backend not implemented: {0}")]
    NotImplemented(String),
}

/// Result alias for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
