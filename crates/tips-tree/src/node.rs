//! The TIPS node itself and the arena that owns the live tree.
//!
//! Grounded on `tips_nodes.py`'s `TipsNode` class. The original keeps a
//! `parent` back-reference on every node; the port drops it; nodes are
//! addressed purely by their deterministic id string and a refinement
//! replaces a node in the arena outright rather than mutating a tree in
//! place with live parent pointers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tips_hierarchy::{AttributeIndex, NodeId as HNodeId};

use crate::counter::NodeCounter;
use crate::rows::RecordId;

/// A node's deterministic identity: the concatenation of
/// `"<attr>.<label>|"` for every attribute in ascending index order,
/// computed by [`crate::node_id_of`].
pub type TipsNodeId = String;

/// One node of the shared TIPS tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipsNode {
    /// This node's deterministic id.
    pub id: TipsNodeId,
    /// The active hierarchy node for every QID attribute, fixing this
    /// node's position in the generalization lattice.
    pub qid_state: BTreeMap<AttributeIndex, HNodeId>,
    /// This node's own record count.
    pub node_counter: NodeCounter,
    /// For every attribute whose active hierarchy node has children,
    /// the counter a refinement along that attribute would produce for
    /// each candidate child, keyed by the child's own (not-yet-created)
    /// node id.
    pub child_counters: BTreeMap<AttributeIndex, BTreeMap<TipsNodeId, NodeCounter>>,
    /// Participant-side only: the locally held records currently
    /// covered by this node. `None` on the coordinator, which never
    /// sees raw records.
    pub records: Option<Vec<RecordId>>,
}

/// Owns every live `TipsNode`, keyed by its deterministic id. A
/// `BTreeMap` gives the ascending-id iteration order the protocol's
/// determinism depends on (counter-group submission order, output
/// collection order).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arena {
    nodes: BTreeMap<TipsNodeId, TipsNode>,
}

impl Arena {
    /// An empty arena.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Insert or replace a node, keyed by its own id.
    pub fn insert(&mut self, node: TipsNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Borrow a node by id.
    pub fn get(&self, id: &str) -> Option<&TipsNode> {
        self.nodes.get(id)
    }

    /// Mutably borrow a node by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut TipsNode> {
        self.nodes.get_mut(id)
    }

    /// Remove and return a node by id.
    pub fn remove(&mut self, id: &str) -> Option<TipsNode> {
        self.nodes.remove(id)
    }

    /// True if a node with this id is currently live.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// The number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over `(id, node)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&TipsNodeId, &TipsNode)> {
        self.nodes.iter()
    }

    /// Iterate over live nodes mutably, in ascending id order.
    pub fn iter_mut_values(&mut self) -> impl Iterator<Item = &mut TipsNode> {
        self.nodes.values_mut()
    }

    /// Every currently live node's id, in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = &TipsNodeId> {
        self.nodes.keys()
    }
}
