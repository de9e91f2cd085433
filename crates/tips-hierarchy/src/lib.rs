//! Per-attribute QID generalization hierarchies.
//!
//! Nodes live in a flat arena (`HierarchyArena`) indexed by `NodeId`
//! rather than owning parent back-references, so the tree has no cyclic
//! references to reason about — parent lookups, when needed, are done
//! via a short-lived index built during [`HierarchyArena::check_consistency`].

pub mod error;
pub mod value;

pub use error::{HierarchyError, Result};
pub use value::AttrValue;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute index (CSV column position) identifying a QID attribute.
pub type AttributeIndex = u32;

/// Human-readable generalization label, e.g. `"30:40"` or `"ANY"`.
pub type GeneralizationLabel = String;

/// Index of a node within a [`HierarchyArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// One node of a QID hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HierarchyNode {
    /// Closed integer range `[min, max]`.
    Numerical {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// Child nodes that must exactly partition `[min, max]`.
        children: Vec<NodeId>,
    },
    /// A single categorical label, covering itself and every descendant.
    Categorical {
        /// This node's own value.
        value: String,
        /// Child nodes, each a strict specialization of `value`.
        children: Vec<NodeId>,
    },
}

impl HierarchyNode {
    fn children(&self) -> &[NodeId] {
        match self {
            HierarchyNode::Numerical { children, .. } => children,
            HierarchyNode::Categorical { children, .. } => children,
        }
    }

    fn children_mut(&mut self) -> &mut Vec<NodeId> {
        match self {
            HierarchyNode::Numerical { children, .. } => children,
            HierarchyNode::Categorical { children, .. } => children,
        }
    }
}

/// Arena owning every node of one attribute's hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyArena {
    nodes: Vec<HierarchyNode>,
}

impl HierarchyArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Insert a numerical node with no children and return its id.
    pub fn insert_numerical(&mut self, min: i64, max: i64) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(HierarchyNode::Numerical {
            min,
            max,
            children: Vec::new(),
        });
        id
    }

    /// Insert a categorical node with no children and return its id.
    pub fn insert_categorical(&mut self, value: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(HierarchyNode::Categorical {
            value: value.into(),
            children: Vec::new(),
        });
        id
    }

    /// Link `child` as a child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0 as usize].children_mut().push(child);
    }

    /// Borrow a node by id.
    pub fn node(&self, id: NodeId) -> &HierarchyNode {
        &self.nodes[id.0 as usize]
    }

    /// Children of a node, in hierarchy-definition order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children()
    }

    /// `covers(v)` per spec.md §3: numerical nodes check range membership,
    /// categorical nodes check equality or recurse into children.
    pub fn covers(&self, id: NodeId, value: &AttrValue) -> bool {
        match self.node(id) {
            HierarchyNode::Numerical { min, max, .. } => match value.as_int() {
                Some(v) => *min <= v && v <= *max,
                None => false,
            },
            HierarchyNode::Categorical { value: own, children } => match value.as_str() {
                Some(v) if v == own => true,
                Some(_) | None => children.iter().any(|&c| self.covers(c, value)),
            },
        }
    }

    /// `label()` per spec.md §3: `"min:max"` (or just `"min"` if equal) for
    /// numerical nodes, the literal value for categorical nodes.
    pub fn label(&self, id: NodeId) -> GeneralizationLabel {
        match self.node(id) {
            HierarchyNode::Numerical { min, max, .. } if min == max => min.to_string(),
            HierarchyNode::Numerical { min, max, .. } => format!("{min}:{max}"),
            HierarchyNode::Categorical { value, .. } => value.clone(),
        }
    }

    /// Recursively validate the subtree rooted at `id`.
    ///
    /// Leaf nodes are always consistent. Internal nodes must have
    /// same-variant children; numerical children must exactly partition
    /// the parent's range with no gap or overlap; categorical subtrees
    /// must not repeat `id`'s own label anywhere below it.
    pub fn check_consistency(&self, id: NodeId) -> Result<()> {
        match self.node(id) {
            HierarchyNode::Numerical { min, max, children } => {
                if min > max {
                    return Err(HierarchyError::InvalidRange {
                        min: *min,
                        max: *max,
                    });
                }
                if children.is_empty() {
                    return Ok(());
                }
                for &c in children {
                    if !matches!(self.node(c), HierarchyNode::Numerical { .. }) {
                        return Err(HierarchyError::MixedVariant {
                            label: self.label(id),
                        });
                    }
                }
                self.check_numerical_partition(id, *min, *max, children)?;
                for &c in children {
                    self.check_consistency(c)?;
                }
                Ok(())
            }
            HierarchyNode::Categorical { value, children } => {
                if children.is_empty() {
                    return Ok(());
                }
                for &c in children {
                    if !matches!(self.node(c), HierarchyNode::Categorical { .. }) {
                        return Err(HierarchyError::MixedVariant {
                            label: self.label(id),
                        });
                    }
                }
                if self.subtree_contains_value(id, value, true) {
                    return Err(HierarchyError::DuplicateLabel {
                        label: value.clone(),
                    });
                }
                for &c in children {
                    self.check_consistency(c)?;
                }
                Ok(())
            }
        }
    }

    /// True if any descendant of `id` (excluding itself unless
    /// `skip_self`) carries `value`.
    fn subtree_contains_value(&self, id: NodeId, value: &str, skip_self: bool) -> bool {
        let own_match = !skip_self
            && matches!(self.node(id), HierarchyNode::Categorical { value: v, .. } if v == value);
        if own_match {
            return true;
        }
        self.children(id)
            .iter()
            .any(|&c| self.subtree_contains_value(c, value, false))
    }

    fn check_numerical_partition(
        &self,
        parent: NodeId,
        min: i64,
        max: i64,
        children: &[NodeId],
    ) -> Result<()> {
        // Track exact integer coverage of [min, max] by sorting child
        // ranges and walking them in order, the way the original
        // implementation removes each covered value from a working set
        // (O(range) there; O(children log children) here).
        let mut ranges: Vec<(i64, i64)> = children
            .iter()
            .map(|&c| match self.node(c) {
                HierarchyNode::Numerical { min, max, .. } => (*min, *max),
                HierarchyNode::Categorical { .. } => unreachable!("variant checked by caller"),
            })
            .collect();
        ranges.sort_unstable();

        let mut cursor = min;
        for (cmin, cmax) in ranges {
            if cmin != cursor || cmax < cmin {
                return Err(HierarchyError::GapOrOverlap {
                    label: self.label(parent),
                    min,
                    max,
                });
            }
            cursor = cmax + 1;
        }
        if cursor != max + 1 {
            return Err(HierarchyError::GapOrOverlap {
                label: self.label(parent),
                min,
                max,
            });
        }
        Ok(())
    }

    /// Build a balanced binary numerical hierarchy over `[min, max]` by
    /// repeatedly splitting the remaining span in half until every leaf
    /// is a singleton, exactly as the original's
    /// `create_balanced_numerical_hierarchy`.
    pub fn create_balanced_numerical_hierarchy(&mut self, min: i64, max: i64) -> NodeId {
        let id = self.insert_numerical(min, max);
        let span = max - min;
        if span > 0 {
            let half = min + span / 2;
            let left = self.create_balanced_numerical_hierarchy(min, half);
            let right = self.create_balanced_numerical_hierarchy(half + 1, max);
            self.add_child(id, left);
            self.add_child(id, right);
        }
        id
    }
}

/// Mapping from attribute index to the root of its hierarchy, fixing
/// the set of attributes being generalized. `BTreeMap` gives the
/// ascending-attribute-index iteration order the protocol's determinism
/// depends on.
pub type QidAttributeSet = BTreeMap<AttributeIndex, (HierarchyArena, NodeId)>;

/// Validate every attribute's hierarchy in a [`QidAttributeSet`].
pub fn check_attribute_set_consistency(attrs: &QidAttributeSet) -> Result<()> {
    for (arena, root) in attrs.values() {
        arena.check_consistency(*root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_overlap_is_rejected() {
        // Hierarchy NumNode(0,3) with children (0,1),(2,3): consistent.
        let mut arena = HierarchyArena::new();
        let root = arena.insert_numerical(0, 3);
        let left = arena.insert_numerical(0, 1);
        let right = arena.insert_numerical(2, 3);
        arena.add_child(root, left);
        arena.add_child(root, right);
        assert!(arena.check_consistency(root).is_ok());

        // Adding child (1,2) overlaps/gaps: fails.
        let mut arena2 = HierarchyArena::new();
        let root2 = arena2.insert_numerical(0, 3);
        let a = arena2.insert_numerical(0, 1);
        let b = arena2.insert_numerical(2, 3);
        let c = arena2.insert_numerical(1, 2);
        arena2.add_child(root2, a);
        arena2.add_child(root2, b);
        arena2.add_child(root2, c);
        assert!(matches!(
            arena2.check_consistency(root2),
            Err(HierarchyError::GapOrOverlap { .. })
        ));
    }

    #[test]
    fn duplicate_categorical_label_is_rejected() {
        // Categorical root ANY with child ANY: fails (duplicate subtree value).
        let mut arena = HierarchyArena::new();
        let root = arena.insert_categorical("ANY");
        let child = arena.insert_categorical("ANY");
        arena.add_child(root, child);
        assert!(matches!(
            arena.check_consistency(root),
            Err(HierarchyError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn balanced_hierarchy_yields_singleton_leaves() {
        let mut arena = HierarchyArena::new();
        let root = arena.create_balanced_numerical_hierarchy(0, 3);
        assert!(arena.check_consistency(root).is_ok());

        let children = arena.children(root).to_vec();
        assert_eq!(children.len(), 2);
        let labels: Vec<_> = children.iter().map(|&c| arena.label(c)).collect();
        assert_eq!(labels, vec!["0:1".to_string(), "2:3".to_string()]);

        // Leaves are the singletons {0,1,2,3}.
        let mut leaves = Vec::new();
        fn collect_leaves(arena: &HierarchyArena, id: NodeId, out: &mut Vec<i64>) {
            let children = arena.children(id);
            if children.is_empty() {
                if let HierarchyNode::Numerical { min, max, .. } = arena.node(id) {
                    assert_eq!(min, max);
                    out.push(*min);
                }
            } else {
                for &c in children {
                    collect_leaves(arena, c, out);
                }
            }
        }
        collect_leaves(&arena, root, &mut leaves);
        leaves.sort_unstable();
        assert_eq!(leaves, vec![0, 1, 2, 3]);
    }

    #[test]
    fn covers_and_label_basic() {
        let mut arena = HierarchyArena::new();
        let root = arena.insert_numerical(0, 100);
        assert!(arena.covers(root, &AttrValue::Int(50)));
        assert!(!arena.covers(root, &AttrValue::Int(101)));
        assert_eq!(arena.label(root), "0:100");

        let mut cat = HierarchyArena::new();
        let any = cat.insert_categorical("ANY");
        let male = cat.insert_categorical("male");
        let female = cat.insert_categorical("female");
        cat.add_child(any, male);
        cat.add_child(any, female);
        assert!(cat.covers(any, &AttrValue::Str("male".into())));
        assert!(cat.covers(any, &AttrValue::Str("female".into())));
        assert!(!cat.covers(male, &AttrValue::Str("female".into())));
    }
}
