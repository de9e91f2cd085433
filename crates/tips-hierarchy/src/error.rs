//! Hierarchy consistency errors.

use serde::{Deserialize, Serialize};

/// Errors raised while building or validating a QID hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum HierarchyError {
    /// A numerical node's `min` exceeded its `max`.
    #[error("invalid range: min {min} > max {max}")]
    InvalidRange {
        /// The offending minimum.
        min: i64,
        /// The offending maximum.
        max: i64,
    },

    /// A node's children mix numerical and categorical variants.
    #[error("node {label}: children have mismatched variants")]
    MixedVariant {
        /// Label of the parent node.
        label: String,
    },

    /// Numerical children leave a gap or overlap within the parent's range.
    #[error("node {label}: children do not exactly partition [{min}, {max}]")]
    GapOrOverlap {
        /// Label of the parent node.
        label: String,
        /// Parent minimum.
        min: i64,
        /// Parent maximum.
        max: i64,
    },

    /// A categorical subtree repeats an ancestor's label.
    #[error("node {label}: descendant repeats ancestor label")]
    DuplicateLabel {
        /// Label shared by the ancestor and the offending descendant.
        label: String,
    },
}

/// Result alias for hierarchy operations.
pub type Result<T> = std::result::Result<T, HierarchyError>;
