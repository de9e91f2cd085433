//! Concrete QID attribute values.
//!
//! The original Python engine treats attribute values as untyped; a CSV
//! cell is checked with Python's `==`/`<`/`>`. Here the CSV boundary
//! (`tips-cli`) parses each cell into one of these two variants up front.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single quasi-identifier cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    /// An integer-valued attribute (e.g. age).
    Int(i64),
    /// A categorical attribute (e.g. sex, profession).
    Str(String),
}

impl AttrValue {
    /// Numeric comparison helper used by `Numerical` node coverage checks.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Str(_) => None,
        }
    }

    /// String comparison helper used by `Categorical` node coverage checks.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            AttrValue::Int(_) => None,
        }
    }

    /// Order two values for sorting output rows by a QID column, matching
    /// the final-collection sort-by-second-column requirement.
    pub fn cmp_value(&self, other: &AttrValue) -> Ordering {
        match (self, other) {
            (AttrValue::Int(a), AttrValue::Int(b)) => a.cmp(b),
            (AttrValue::Str(a), AttrValue::Str(b)) => a.cmp(b),
            (AttrValue::Int(_), AttrValue::Str(_)) => Ordering::Less,
            (AttrValue::Str(_), AttrValue::Int(_)) => Ordering::Greater,
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Str(v) => write!(f, "{v}"),
        }
    }
}
