//! The shared TIPS tree: link-head bookkeeping, counter information,
//! and the best-refinement search that drives top-down specialization.
//!
//! Grounded on `tips_nodes.py` (link heads, refinement, best-refinement
//! scoring) and `counter_information_data.py` (the `counter` module).
//! The original keeps the whole tree as one big dict of `TipsNode`
//! objects linked by `parent`/`children_nodes` references that are
//! mutated in place; here the tree lives in an [`Arena`] addressed by
//! deterministic id strings, and link heads are rebuilt explicitly on
//! every refinement rather than tracked via live object references.

pub mod counter;
mod error;
mod node;
#[cfg(test)]
mod proptests;
mod rows;

pub use counter::{filter_by_id, groups_from, incorporate, merge_add, CounterGroup, NodeCounter};
pub use error::{Result, TreeError};
pub use node::{Arena, TipsNode, TipsNodeId};
pub use rows::{RecordId, RowSource};

use indexmap::IndexMap;
use std::collections::BTreeMap;
use tips_hierarchy::{AttrValue, AttributeIndex, GeneralizationLabel, QidAttributeSet};

/// Every current candidate-refinement bucket for one attribute, keyed
/// by generalization label in first-seen order (an `IndexMap`, not a
/// `BTreeMap`: the best-refinement tie-break walks labels in the order
/// they were created, not alphabetically, matching a Python dict's
/// insertion order).
pub type LinkHeadBuckets = IndexMap<GeneralizationLabel, Vec<TipsNodeId>>;

/// `LinkHeads[attr][label] -> [node ids]`, refined in place every round.
/// The outer `BTreeMap` gives the ascending-attribute-index walk the
/// best-refinement search and counter-group gathering both depend on.
pub type LinkHeads = BTreeMap<AttributeIndex, LinkHeadBuckets>;

/// Compute a node's deterministic id: the concatenation of
/// `"<attr>.<label>|"` over every attribute in ascending index order.
pub fn node_id_of(
    attrs: &QidAttributeSet,
    qid_state: &BTreeMap<AttributeIndex, tips_hierarchy::NodeId>,
) -> TipsNodeId {
    let mut id = String::new();
    for (&attr, &hnode) in qid_state {
        let (arena, _) = &attrs[&attr];
        id.push_str(&attr.to_string());
        id.push('.');
        id.push_str(&arena.label(hnode));
        id.push('|');
    }
    id
}

fn build_child_counters(
    attrs: &QidAttributeSet,
    qid_state: &BTreeMap<AttributeIndex, tips_hierarchy::NodeId>,
    participant: Option<(&[RecordId], &dyn RowSource)>,
) -> BTreeMap<AttributeIndex, BTreeMap<TipsNodeId, NodeCounter>> {
    let mut out = BTreeMap::new();
    for (&attr, &hnode) in qid_state {
        let (harena, _) = &attrs[&attr];
        let children = harena.children(hnode);
        if children.is_empty() {
            continue;
        }
        let mut per_child = BTreeMap::new();
        for &hchild in children {
            let mut child_qid_state = qid_state.clone();
            child_qid_state.insert(attr, hchild);
            let child_id = node_id_of(attrs, &child_qid_state);
            let counter = match participant {
                Some((records, rows)) => {
                    let n = records
                        .iter()
                        .filter(|&&r| harena.covers(hchild, rows.qid_value(r, attr)))
                        .count() as u64;
                    NodeCounter::DataContent(n)
                }
                None => NodeCounter::Undefined,
            };
            per_child.insert(child_id, counter);
        }
        out.insert(attr, per_child);
    }
    out
}

/// Build the root node and seed its link heads.
///
/// On the coordinator, pass `participant = None`: the root's own
/// counter and every candidate child's counter start `Undefined`, to be
/// filled in by the first round's `>k` oracle call.
///
/// On a participant, pass the records it holds and a [`RowSource`] to
/// look up their QID values: the root's counter becomes
/// `DataContent(records.len())` and every candidate child's counter is
/// the locally known `DataContent` count, computed directly rather than
/// through the oracle (mirrors `TipsNode.__init__`'s `raw_records is not
/// None` branch).
pub fn setup_root(
    attrs: &QidAttributeSet,
    participant: Option<(Vec<RecordId>, &dyn RowSource)>,
) -> (Arena, LinkHeads, TipsNodeId) {
    let qid_state: BTreeMap<AttributeIndex, tips_hierarchy::NodeId> =
        attrs.iter().map(|(&attr, &(_, root))| (attr, root)).collect();
    let root_id = node_id_of(attrs, &qid_state);

    let (node_counter, records, child_ctx) = match &participant {
        Some((records, rows)) => (
            NodeCounter::DataContent(records.len() as u64),
            Some(records.clone()),
            Some((records.as_slice(), *rows)),
        ),
        None => (NodeCounter::Undefined, None, None),
    };
    let child_counters = build_child_counters(attrs, &qid_state, child_ctx);

    let mut arena = Arena::new();
    arena.insert(TipsNode {
        id: root_id.clone(),
        qid_state: qid_state.clone(),
        node_counter,
        child_counters,
        records,
    });

    let mut link_heads = LinkHeads::new();
    for (&attr, &hnode) in &qid_state {
        let (harena, _) = &attrs[&attr];
        let label = harena.label(hnode);
        link_heads
            .entry(attr)
            .or_default()
            .entry(label)
            .or_default()
            .push(root_id.clone());
    }

    (arena, link_heads, root_id)
}

/// Refine every node currently linked under `link_heads[attr][label]`
/// one level deeper along `attr`, replacing each with its hierarchy
/// children and re-threading the link heads accordingly.
///
/// Returns the ids of every newly created node. Errors if the bucket
/// does not exist, or if the attribute's active hierarchy node is
/// already a leaf.
///
/// Pass `rows = None` on the coordinator (candidate counters stay
/// `Undefined`, to be filled by the next oracle round); pass a
/// [`RowSource`] on a participant so each child's records and local
/// counts are partitioned immediately, mirroring
/// `TipsNode.get_refined_child_nodes`'s `raw_records is not None` check.
pub fn refine(
    arena: &mut Arena,
    link_heads: &mut LinkHeads,
    attrs: &QidAttributeSet,
    rows: Option<&dyn RowSource>,
    attr: AttributeIndex,
    label: &str,
) -> Result<Vec<TipsNodeId>> {
    let (harena, _) = attrs
        .get(&attr)
        .ok_or(TreeError::UnknownAttribute { attr })?;

    let bucket = link_heads
        .get(&attr)
        .and_then(|m| m.get(label))
        .ok_or_else(|| TreeError::no_such_bucket(attr, label))?;
    let sample = bucket
        .first()
        .and_then(|id| arena.get(id))
        .expect("link head referenced a node missing from the arena");
    if harena.children(sample.qid_state[&attr]).is_empty() {
        return Err(TreeError::not_refinable(attr, label));
    }

    let bucket = link_heads
        .get_mut(&attr)
        .and_then(|m| m.shift_remove(label))
        .expect("bucket existence already checked above");

    let mut new_ids = Vec::new();

    for old_id in &bucket {
        let old_node = arena
            .remove(old_id)
            .expect("link head referenced a node missing from the arena");

        let active = old_node.qid_state[&attr];
        let hchildren = harena.children(active).to_vec();

        // Detach the old node from every other attribute's bucket;
        // the attr/label bucket was already fully removed above.
        for &other_attr in old_node.qid_state.keys() {
            if other_attr == attr {
                continue;
            }
            let (oarena, _) = &attrs[&other_attr];
            let other_label = oarena.label(old_node.qid_state[&other_attr]);
            if let Some(v) = link_heads
                .get_mut(&other_attr)
                .and_then(|m| m.get_mut(&other_label))
            {
                v.retain(|id| id != old_id);
            }
        }

        let mut children_ids = Vec::new();
        for hchild in hchildren {
            let mut new_qid_state = old_node.qid_state.clone();
            new_qid_state.insert(attr, hchild);
            let new_id = node_id_of(attrs, &new_qid_state);
            let child_label = harena.label(hchild);

            let new_counter = old_node
                .child_counters
                .get(&attr)
                .and_then(|m| m.get(&new_id))
                .cloned()
                .unwrap_or(NodeCounter::Undefined);

            let new_records = match (&old_node.records, rows) {
                (Some(recs), Some(rs)) => Some(
                    recs.iter()
                        .copied()
                        .filter(|&r| harena.covers(hchild, rs.qid_value(r, attr)))
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            };
            let participant_ctx = match (&new_records, rows) {
                (Some(recs), Some(rs)) => Some((recs.as_slice(), rs)),
                _ => None,
            };
            let new_child_counters = build_child_counters(attrs, &new_qid_state, participant_ctx);

            arena.insert(TipsNode {
                id: new_id.clone(),
                qid_state: new_qid_state,
                node_counter: new_counter,
                child_counters: new_child_counters,
                records: new_records,
            });

            link_heads
                .entry(attr)
                .or_default()
                .entry(child_label.clone())
                .or_default()
                .push(new_id.clone());

            children_ids.push(new_id.clone());
            new_ids.push(new_id);
        }

        for &other_attr in old_node.qid_state.keys() {
            if other_attr == attr {
                continue;
            }
            let (oarena, _) = &attrs[&other_attr];
            let other_label = oarena.label(old_node.qid_state[&other_attr]);
            let entry = link_heads
                .entry(other_attr)
                .or_default()
                .entry(other_label)
                .or_default();
            entry.extend(children_ids.iter().cloned());
        }
    }

    Ok(new_ids)
}

/// Find the attribute/label bucket whose refinement would maximize
/// `Σ node_counter.n²` over its member nodes, skipping any bucket whose
/// hierarchy node is already a leaf and zeroing out any bucket where a
/// candidate child counter is `BelowK` anywhere within it. Returns
/// `None` if every refinable bucket scores zero (so the protocol has
/// converged). Ties are broken by walking attributes in ascending index
/// order and labels in first-seen order, so every party reaches the
/// same decision from the same tree state.
pub fn best_refinement(
    arena: &Arena,
    link_heads: &LinkHeads,
    attrs: &QidAttributeSet,
    k: u64,
) -> Option<(AttributeIndex, GeneralizationLabel)> {
    let _ = k; // the threshold is enforced by the oracle, not re-checked here
    let mut best: Option<(AttributeIndex, GeneralizationLabel)> = None;
    let mut best_score: u128 = 0;

    for (&attr, buckets) in link_heads {
        let (harena, _) = &attrs[&attr];
        for (label, node_ids) in buckets {
            if node_ids.is_empty() {
                continue;
            }
            let first = match arena.get(&node_ids[0]) {
                Some(n) => n,
                None => continue,
            };
            let active = first.qid_state[&attr];
            if harena.children(active).is_empty() {
                continue;
            }

            let mut below_k = false;
            let mut score: u128 = 0;
            for nid in node_ids {
                let Some(node) = arena.get(nid) else { continue };
                if let Some(children) = node.child_counters.get(&attr) {
                    if children.values().any(NodeCounter::is_below_k) {
                        below_k = true;
                    }
                }
                let n = node.node_counter.count_or_zero() as u128;
                score += n * n;
            }
            let score = if below_k { 0 } else { score };

            if score > best_score {
                best_score = score;
                best = Some((attr, label.clone()));
            }
        }
    }

    best
}

/// Every QID value still present at a leaf, paired with its final
/// count: a flattened view of the converged tree's `node_counter`s for
/// nodes whose active hierarchy node is a leaf on every attribute.
/// Mirrors `get_anonymous_result_data_from_link_heads`.
pub fn anonymous_result(
    arena: &Arena,
    link_heads: &LinkHeads,
    attrs: &QidAttributeSet,
) -> Vec<(BTreeMap<AttributeIndex, GeneralizationLabel>, u64)> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for buckets in link_heads.values() {
        for node_ids in buckets.values() {
            for id in node_ids {
                if !seen.insert(id.clone()) {
                    continue;
                }
                let Some(node) = arena.get(id) else { continue };
                let is_leaf = node.qid_state.iter().all(|(&attr, &hnode)| {
                    let (harena, _) = &attrs[&attr];
                    harena.children(hnode).is_empty()
                });
                if !is_leaf {
                    continue;
                }
                let labels = node
                    .qid_state
                    .iter()
                    .map(|(&attr, &hnode)| {
                        let (harena, _) = &attrs[&attr];
                        (attr, harena.label(hnode))
                    })
                    .collect();
                out.push((labels, node.node_counter.count_or_zero()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tips_hierarchy::HierarchyArena;

    struct StaticRows(Vec<Vec<AttrValue>>);
    impl RowSource for StaticRows {
        fn qid_value(&self, record: RecordId, attr: AttributeIndex) -> &AttrValue {
            &self.0[record as usize][attr as usize]
        }
    }

    fn two_attr_set() -> QidAttributeSet {
        let mut age = HierarchyArena::new();
        let age_root = age.create_balanced_numerical_hierarchy(0, 3);

        let mut sex = HierarchyArena::new();
        let sex_any = sex.insert_categorical("ANY");
        let male = sex.insert_categorical("male");
        let female = sex.insert_categorical("female");
        sex.add_child(sex_any, male);
        sex.add_child(sex_any, female);

        let mut attrs = QidAttributeSet::new();
        attrs.insert(0, (age, age_root));
        attrs.insert(1, (sex, sex_any));
        attrs
    }

    #[test]
    fn setup_root_coordinator_starts_undefined() {
        let attrs = two_attr_set();
        let (arena, link_heads, root_id) = setup_root(&attrs, None);
        let root = arena.get(&root_id).unwrap();
        assert_eq!(root.node_counter, NodeCounter::Undefined);
        assert_eq!(link_heads.len(), 2);
        assert_eq!(link_heads[&0]["0:3"], vec![root_id.clone()]);
        assert_eq!(link_heads[&1]["ANY"], vec![root_id]);
    }

    #[test]
    fn setup_root_participant_counts_local_records() {
        let attrs = two_attr_set();
        let rows = StaticRows(vec![
            vec![AttrValue::Int(0), AttrValue::Str("male".into())],
            vec![AttrValue::Int(2), AttrValue::Str("female".into())],
            vec![AttrValue::Int(3), AttrValue::Str("male".into())],
        ]);
        let (arena, _link_heads, root_id) =
            setup_root(&attrs, Some((vec![0, 1, 2], &rows)));
        let root = arena.get(&root_id).unwrap();
        assert_eq!(root.node_counter, NodeCounter::DataContent(3));

        // Candidate children along attribute 0 (age: 0:1 vs 2:3) split 1/2.
        let age_children = &root.child_counters[&0];
        let counts: Vec<u64> = age_children.values().map(NodeCounter::count_or_zero).collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2]);
    }

    #[test]
    fn refine_replaces_bucket_and_rethreads_other_attributes() {
        let attrs = two_attr_set();
        let (mut arena, mut link_heads, root_id) = setup_root(&attrs, None);

        // Fake oracle resolution so the age bucket looks refinable.
        let root = arena.get_mut(&root_id).unwrap();
        for c in root.child_counters.get_mut(&0).unwrap().values_mut() {
            *c = NodeCounter::Valid(5);
        }

        let new_ids = refine(&mut arena, &mut link_heads, &attrs, None, 0, "0:3").unwrap();
        assert_eq!(new_ids.len(), 2);

        // Age bucket "0:3" is gone; two fresh buckets exist instead.
        assert!(!link_heads[&0].contains_key("0:3"));
        assert_eq!(link_heads[&0].get("0:1").map(Vec::len), Some(1));
        assert_eq!(link_heads[&0].get("2:3").map(Vec::len), Some(1));

        // Both new nodes still appear under sex's unchanged "ANY" bucket.
        assert_eq!(link_heads[&1]["ANY"].len(), 2);
        assert!(!link_heads[&1]["ANY"].contains(&root_id));
    }

    #[test]
    fn best_refinement_skips_leaves_and_below_k_buckets() {
        let attrs = two_attr_set();
        let (mut arena, link_heads, root_id) = setup_root(&attrs, None);

        // No counters resolved yet: nothing scores above zero.
        assert_eq!(best_refinement(&arena, &link_heads, &attrs, 2), None);

        let root = arena.get_mut(&root_id).unwrap();
        root.node_counter = NodeCounter::Valid(10);
        for c in root.child_counters.get_mut(&0).unwrap().values_mut() {
            *c = NodeCounter::Valid(5);
        }
        for c in root.child_counters.get_mut(&1).unwrap().values_mut() {
            *c = NodeCounter::BelowK;
        }

        // Attribute 0 scores 10^2 = 100 and is not BelowK; attribute 1
        // has a BelowK child and is zeroed out.
        assert_eq!(
            best_refinement(&arena, &link_heads, &attrs, 2),
            Some((0, "0:3".to_string()))
        );
    }
}
