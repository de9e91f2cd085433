//! Counter information: the tagged record-count variants attached to
//! every TIPS node and candidate child, and the group operations used
//! to shuttle them through the `>k` oracle.
//!
//! Grounded on `counter_information_data.py`'s `NodeCounterType` enum
//! and its module-level `add_counter_information_data`,
//! `counter_groups_from_counter_information_data`,
//! `node_ids_from_counter_groups`, `filter_counter_groups_by_id`, and
//! `incorporate_counter_groups` functions. The Python original threads
//! counters as bare integers with a `-1` "undefined" sentinel and `0`
//! doing double duty for both "empty" and "below k"; here each state is
//! its own variant so a caller can never mistake one for a plain count.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::TipsNodeId;

/// The record count behind one TIPS node or candidate child, tagged by
/// how that count was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCounter {
    /// A participant's own local count, computed directly from its
    /// held records. Never leaves a participant process.
    DataContent(u64),
    /// Not yet known; awaiting a secure-sum round.
    Undefined,
    /// Known, and known to be zero records.
    Empty,
    /// Known to be nonzero but below the k threshold; the exact count
    /// is intentionally not retained.
    BelowK,
    /// Known, and at least k.
    Valid(u64),
}

impl NodeCounter {
    /// The record count, or `0` for every variant that does not carry
    /// one (`Undefined`, `Empty`, `BelowK`). Used by refinement scoring,
    /// which only ever sums over `Valid`/`DataContent` counters in
    /// practice but must not panic on the others.
    pub fn count_or_zero(&self) -> u64 {
        match self {
            NodeCounter::DataContent(n) | NodeCounter::Valid(n) => *n,
            NodeCounter::Undefined | NodeCounter::Empty | NodeCounter::BelowK => 0,
        }
    }

    /// True for [`NodeCounter::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, NodeCounter::Undefined)
    }

    /// True for [`NodeCounter::BelowK`].
    pub fn is_below_k(&self) -> bool {
        matches!(self, NodeCounter::BelowK)
    }
}

/// A set of sibling counters that must be aggregated together before
/// being handed to the `>k` oracle: if any member is `BelowK`, the
/// whole group collapses to zero information.
pub type CounterGroup = BTreeMap<TipsNodeId, NodeCounter>;

/// Sum two counters that describe the same node id contributed by two
/// different participants, folding the tagged variants the way a plain
/// integer sum would, but refusing to silently add meaning into an
/// `Undefined`/`BelowK` counter.
///
/// This is not present in the original `counter_information_data.py`
/// module — the Python engine only ever combines raw local counts
/// before they are sent through the oracle. It is added here so a
/// participant that folds per-round deltas locally (a common
/// aggregation pattern the protocol leaves implicit) has a total
/// function to do it with, rather than reaching for integer arithmetic
/// on the wrong variant.
pub fn merge_add(a: &NodeCounter, b: &NodeCounter) -> NodeCounter {
    match (a, b) {
        (NodeCounter::DataContent(x), NodeCounter::DataContent(y)) => {
            NodeCounter::DataContent(x + y)
        }
        (NodeCounter::Empty, NodeCounter::Empty) => NodeCounter::Empty,
        (NodeCounter::Empty, other) | (other, NodeCounter::Empty) => other.clone(),
        (NodeCounter::BelowK, _) | (_, NodeCounter::BelowK) => NodeCounter::BelowK,
        (NodeCounter::Undefined, _) | (_, NodeCounter::Undefined) => NodeCounter::Undefined,
        (NodeCounter::Valid(x), NodeCounter::Valid(y)) => NodeCounter::Valid(x + y),
        (NodeCounter::Valid(x), NodeCounter::DataContent(y))
        | (NodeCounter::DataContent(y), NodeCounter::Valid(x)) => NodeCounter::Valid(x + y),
    }
}

/// Collect every counter group held in `arena`: one group per node's own
/// `node_counter` singleton, plus one group per attribute's
/// `child_counters` map. Mirrors
/// `counter_groups_from_counter_information_data`'s walk over every
/// `TipsNode`, grouping each node's children by attribute so a group
/// never mixes candidate children from two different generalization
/// dimensions.
///
/// When `only_undefined` is set (the round-start case, gathering exactly
/// what must be sent to the oracle), entries that are not
/// [`NodeCounter::Undefined`] are dropped, and an all-dropped group is
/// omitted entirely.
pub fn groups_from(arena: &crate::Arena, only_undefined: bool) -> Vec<CounterGroup> {
    let mut groups = Vec::new();
    for (id, node) in arena.iter() {
        if !only_undefined || node.node_counter.is_undefined() {
            let mut g = CounterGroup::new();
            g.insert(id.clone(), node.node_counter.clone());
            groups.push(g);
        }
        for children in node.child_counters.values() {
            let g: CounterGroup = children
                .iter()
                .filter(|(_, c)| !only_undefined || c.is_undefined())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if !g.is_empty() {
                groups.push(g);
            }
        }
    }
    groups
}

/// Every node id named by any group, flattened and order-preserving
/// within each group's own `BTreeMap` order. Used to build the sorted
/// submission list handed to the oracle.
pub fn node_ids_of(groups: &[CounterGroup]) -> Vec<TipsNodeId> {
    groups.iter().flat_map(|g| g.keys().cloned()).collect()
}

/// Restrict each group to the ids present in `ids`, dropping groups that
/// become empty. Used to project an oracle's flat answer list back onto
/// the grouping it was derived from.
pub fn filter_by_id(groups: &[CounterGroup], ids: &BTreeSet<TipsNodeId>) -> Vec<CounterGroup> {
    groups
        .iter()
        .filter_map(|g| {
            let filtered: CounterGroup = g
                .iter()
                .filter(|(k, _)| ids.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(filtered)
            }
        })
        .collect()
}

/// Write oracle-resolved counters back into `arena`: every id present in
/// `groups` overwrites the matching `node_counter` or `child_counters`
/// entry in place, whatever its prior value. Ids absent from `groups`
/// are left untouched. Mirrors `incorporate_counter_groups`.
pub fn incorporate(arena: &mut crate::Arena, groups: &[CounterGroup]) {
    let flat: BTreeMap<TipsNodeId, NodeCounter> = groups
        .iter()
        .flat_map(|g| g.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect();
    for node in arena.iter_mut_values() {
        if let Some(v) = flat.get(&node.id) {
            node.node_counter = v.clone();
        }
        for children in node.child_counters.values_mut() {
            for (child_id, counter) in children.iter_mut() {
                if let Some(v) = flat.get(child_id) {
                    *counter = v.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_add_below_k_is_contagious() {
        assert_eq!(
            merge_add(&NodeCounter::BelowK, &NodeCounter::Valid(9)),
            NodeCounter::BelowK
        );
        assert_eq!(
            merge_add(&NodeCounter::DataContent(3), &NodeCounter::DataContent(4)),
            NodeCounter::DataContent(7)
        );
    }

    #[test]
    fn filter_by_id_drops_empty_groups() {
        let mut g1 = CounterGroup::new();
        g1.insert("a".to_string(), NodeCounter::Valid(5));
        g1.insert("b".to_string(), NodeCounter::BelowK);
        let groups = vec![g1];

        let mut keep = BTreeSet::new();
        keep.insert("a".to_string());
        let filtered = filter_by_id(&groups, &keep);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].len(), 1);
        assert!(filtered[0].contains_key("a"));

        let empty_keep = BTreeSet::new();
        assert!(filter_by_id(&groups, &empty_keep).is_empty());
    }
}
