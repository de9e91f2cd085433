//! TIPS tree structural errors.

use tips_hierarchy::AttributeIndex;

/// Errors raised while refining or querying the shared TIPS tree.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TreeError {
    /// The named attribute/label bucket is not present in the link heads.
    #[error("no link head bucket for attribute {attr} label {label:?}")]
    NoSuchBucket {
        /// The attribute index searched.
        attr: AttributeIndex,
        /// The label searched.
        label: String,
    },

    /// Every node behind the bucket is already a leaf of its hierarchy.
    #[error("attribute {attr} label {label:?} has no further specialization")]
    NotRefinable {
        /// The attribute index that cannot be refined further.
        attr: AttributeIndex,
        /// The label that cannot be refined further.
        label: String,
    },

    /// An attribute index was referenced that is not part of the QID set.
    #[error("attribute {attr} is not part of the generalization set")]
    UnknownAttribute {
        /// The offending attribute index.
        attr: AttributeIndex,
    },
}

impl TreeError {
    pub(crate) fn no_such_bucket(attr: AttributeIndex, label: &str) -> Self {
        TreeError::NoSuchBucket {
            attr,
            label: label.to_string(),
        }
    }

    pub(crate) fn not_refinable(attr: AttributeIndex, label: &str) -> Self {
        TreeError::NotRefinable {
            attr,
            label: label.to_string(),
        }
    }
}

/// Result alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
