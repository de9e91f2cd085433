//! The participant-side per-request state machine: holds one party's raw
//! records, answers the coordinator's ring messages, and never lets a
//! [`tips_tree::NodeCounter::DataContent`] value leave the process.
//!
//! Grounded on `box.py`'s `Box` class. The original rebuilds
//! `add_counter_information_data` onto a ring-carried accumulator field
//! every hop; this port's ring messages (see `tips-transport::wire`)
//! carry only the request's pending node ids, not running counter
//! totals, so a participant's contribution for a round is simply its
//! own local groups filtered down to those ids — the accumulation
//! across parties happens once, inside the `>k` oracle, rather than
//! piecemeal around the ring.

mod error;

pub use error::{ParticipantError, Result};

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};
use tips_crypto::{PublicKeyBytes, SealedRow};
use tips_hierarchy::{check_attribute_set_consistency, AttrValue, AttributeIndex, QidAttributeSet};
use tips_transport::{Criterion, CriterionOp, RingMessage};
use tips_tree::counter::{filter_by_id, groups_from, CounterGroup};
use tips_tree::{anonymous_result, refine, setup_root, Arena, LinkHeads, RecordId, RowSource, TipsNodeId};

/// Owns the filtered, center-redacted rows a participant is currently
/// working a request over, addressed by [`RecordId`] for
/// [`tips_tree::setup_root`]/[`tips_tree::refine`].
struct RowStore(Vec<Vec<AttrValue>>);

impl RowSource for RowStore {
    fn qid_value(&self, record: RecordId, attr: AttributeIndex) -> &AttrValue {
        &self.0[record as usize][attr as usize]
    }
}

struct ActiveRequest {
    attrs: QidAttributeSet,
    central_pk: PublicKeyBytes,
    arena: Arena,
    link_heads: LinkHeads,
    rows: RowStore,
}

/// One party's view of one request in flight.
pub struct Participant {
    raw_rows: Vec<Vec<AttrValue>>,
    active: Option<ActiveRequest>,
}

impl Participant {
    /// Construct a participant holding `raw_rows` (every column,
    /// unfiltered — column 0 is assumed to be the center identifier that
    /// criterion matching redacts to `"*"`).
    pub fn new(raw_rows: Vec<Vec<AttrValue>>) -> Self {
        Self {
            raw_rows,
            active: None,
        }
    }

    fn active(&self) -> Result<&ActiveRequest> {
        self.active.as_ref().ok_or(ParticipantError::NoActiveRequest)
    }

    /// Handle the request's opening `Information` message: filter this
    /// party's rows against the criteria, redact the center column of
    /// every matching row, build the local TIPS tree root, and return
    /// this round's contribution (its own local counts, restricted to
    /// the ids the coordinator asked about). Mirrors `Box.__init__` +
    /// `Box.perform_initial_round`.
    pub fn on_information(&mut self, msg: &RingMessage) -> Result<Vec<CounterGroup>> {
        let RingMessage::Information {
            criteria,
            qid_attribute_set,
            coordinator_public_key,
            pending_node_ids,
            ..
        } = msg
        else {
            return Err(ParticipantError::UnexpectedMessage {
                expected: "Information",
                actual: msg.kind(),
            });
        };

        check_attribute_set_consistency(qid_attribute_set)?;

        let filtered = apply_criteria(&self.raw_rows, criteria);
        let rows = RowStore(filtered);
        let record_ids: Vec<RecordId> = (0..rows.0.len() as u32).collect();
        let (arena, link_heads, _root_id) =
            setup_root(qid_attribute_set, Some((record_ids, &rows as &dyn RowSource)));

        let groups = contribution_for(&arena, pending_node_ids);

        self.active = Some(ActiveRequest {
            attrs: qid_attribute_set.clone(),
            central_pk: coordinator_public_key.clone(),
            arena,
            link_heads,
            rows,
        });

        Ok(groups)
    }

    /// Handle a regular `Instruction` message: refine locally along the
    /// announced attribute/label and return the new nodes' local
    /// contribution. Mirrors `Box.perform_regular_round`.
    pub fn on_instruction(&mut self, msg: &RingMessage) -> Result<Vec<CounterGroup>> {
        let RingMessage::Instruction {
            pending_node_ids,
            best_attribute,
            best_label,
        } = msg
        else {
            return Err(ParticipantError::UnexpectedMessage {
                expected: "Instruction",
                actual: msg.kind(),
            });
        };

        let active = self
            .active
            .as_mut()
            .ok_or(ParticipantError::NoActiveRequest)?;

        refine(
            &mut active.arena,
            &mut active.link_heads,
            &active.attrs,
            Some(&active.rows as &dyn RowSource),
            *best_attribute,
            best_label,
        )?;

        Ok(contribution_for(&active.arena, pending_node_ids))
    }

    /// Handle the closing `End` message: seal this party's own converged
    /// equivalence classes under the coordinator's public key, combine
    /// them with the rows already accumulated by predecessors, shuffle
    /// the combined set, and forward it. Mirrors
    /// `Box.perform_secure_data_union_action`.
    pub fn on_end<R: RngCore + CryptoRng>(
        &mut self,
        msg: &RingMessage,
        rng: &mut R,
    ) -> Result<RingMessage> {
        let RingMessage::End { rows: upstream } = msg else {
            return Err(ParticipantError::UnexpectedMessage {
                expected: "End",
                actual: msg.kind(),
            });
        };

        let active = self.active()?;
        let mut combined: Vec<SealedRow> = Vec::with_capacity(upstream.len() + 8);

        for (labels, count) in anonymous_result(&active.arena, &active.link_heads, &active.attrs) {
            let mut row: Vec<AttrValue> = Vec::with_capacity(labels.len() + 2);
            row.push(AttrValue::Str("*".to_string()));
            for (_, label) in labels {
                row.push(AttrValue::Str(label));
            }
            row.push(AttrValue::Int(count as i64));
            combined.push(tips_crypto::seal_row(&active.central_pk, &row, rng)?);
        }

        combined.extend(upstream.iter().cloned());
        combined.shuffle(rng);

        tracing::info!(rows = combined.len(), "participant forwarding collection");
        Ok(RingMessage::End { rows: combined })
    }
}

fn contribution_for(arena: &Arena, pending_node_ids: &[TipsNodeId]) -> Vec<CounterGroup> {
    let wanted: BTreeSet<TipsNodeId> = pending_node_ids.iter().cloned().collect();
    filter_by_id(&groups_from(arena, false), &wanted)
}

/// Filter `rows` against every criterion in order, redacting column 0 to
/// `"*"` on every surviving row. Mirrors `Box._gather_box_data_for_request`,
/// minus the "category not present" branch: `tips-cli` resolves every
/// criterion's category name to a valid column index before a
/// `Criterion` is ever constructed, so that branch cannot occur here.
///
/// `tips-cli` also rejects non-numeric criterion values up front, but a
/// row's stored value for that same column can still be a categorical
/// string (mixed-type CSV columns survive ingestion on a per-cell
/// basis). Per spec.md §7's "invalid criterion" taxonomy this is treated
/// the same as an unparseable value: the dataset is emptied and no
/// further criteria are applied, mirroring
/// `_gather_box_data_for_request`'s `result = []; break`.
fn apply_criteria(rows: &[Vec<AttrValue>], criteria: &[Criterion]) -> Vec<Vec<AttrValue>> {
    let mut result: Vec<Vec<AttrValue>> = rows.to_vec();
    for criterion in criteria {
        let index = criterion.attribute as usize;
        if result
            .iter()
            .any(|row| row.get(index).is_some_and(|value| !same_kind(value, &criterion.value)))
        {
            return Vec::new();
        }
        result = result
            .into_iter()
            .filter_map(|mut row| {
                let matches = row.get(index).is_some_and(|value| {
                    use std::cmp::Ordering;
                    match criterion.op {
                        CriterionOp::Eq => value.cmp_value(&criterion.value) == Ordering::Equal,
                        CriterionOp::Lt => value.cmp_value(&criterion.value) == Ordering::Less,
                        CriterionOp::Gt => value.cmp_value(&criterion.value) == Ordering::Greater,
                    }
                });
                if matches {
                    if let Some(first) = row.first_mut() {
                        *first = AttrValue::Str("*".to_string());
                    }
                    Some(row)
                } else {
                    None
                }
            })
            .collect();
    }
    result
}

fn same_kind(a: &AttrValue, b: &AttrValue) -> bool {
    matches!(
        (a, b),
        (AttrValue::Int(_), AttrValue::Int(_)) | (AttrValue::Str(_), AttrValue::Str(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tips_hierarchy::HierarchyArena;
    use tips_transport::PartyAddress;

    fn attrs() -> QidAttributeSet {
        let mut age = HierarchyArena::new();
        let age_root = age.create_balanced_numerical_hierarchy(0, 3);
        let mut out = QidAttributeSet::new();
        out.insert(1, (age, age_root));
        out
    }

    fn rows() -> Vec<Vec<AttrValue>> {
        vec![
            vec![AttrValue::Int(7), AttrValue::Int(0)],
            vec![AttrValue::Int(8), AttrValue::Int(2)],
            vec![AttrValue::Int(9), AttrValue::Int(3)],
        ]
    }

    fn information(qid_attribute_set: QidAttributeSet, pending_node_ids: Vec<String>) -> RingMessage {
        RingMessage::Information {
            criteria: vec![],
            qid_attribute_set,
            coordinator_public_key: tips_crypto::PublicKeyBytes(vec![1, 2, 3]),
            parties: vec![PartyAddress {
                id: 0,
                host: "127.0.0.1".into(),
                ring_port: 4442,
                motion_port: 5442,
            }],
            pending_node_ids,
        }
    }

    #[test]
    fn on_information_redacts_center_column_and_reports_requested_ids() {
        let mut participant = Participant::new(rows());
        let msg = information(attrs(), vec!["1.0:3|".to_string()]);

        let groups = participant.on_information(&msg).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["1.0:3|"], tips_tree::NodeCounter::DataContent(3));

        let active = participant.active().unwrap();
        for row in &active.rows.0 {
            assert_eq!(row[0], AttrValue::Str("*".to_string()));
        }
    }

    #[test]
    fn on_instruction_without_information_is_rejected() {
        let mut participant = Participant::new(rows());
        let msg = RingMessage::Instruction {
            pending_node_ids: vec![],
            best_attribute: 1,
            best_label: "0:3".to_string(),
        };
        let err = participant.on_instruction(&msg).unwrap_err();
        assert!(matches!(err, ParticipantError::NoActiveRequest));
    }

    #[test]
    fn on_end_seals_rows_and_shuffles_with_upstream() {
        let mut participant = Participant::new(rows());
        let msg = information(attrs(), vec!["1.0:3|".to_string()]);
        participant.on_information(&msg).unwrap();

        let mut rng = rand::thread_rng();
        let end = RingMessage::End { rows: vec![] };
        let forwarded = participant.on_end(&end, &mut rng).unwrap();
        match forwarded {
            RingMessage::End { rows } => assert_eq!(rows.len(), 1),
            _ => panic!("expected End"),
        }
    }

    #[test]
    fn apply_criteria_keeps_matching_rows_and_redacts_first_column() {
        let criteria = vec![Criterion {
            attribute: 1,
            op: CriterionOp::Gt,
            value: AttrValue::Int(1),
        }];
        let filtered = apply_criteria(&rows(), &criteria);
        assert_eq!(filtered.len(), 2);
        for row in &filtered {
            assert_eq!(row[0], AttrValue::Str("*".to_string()));
        }
    }

    #[test]
    fn apply_criteria_empties_dataset_on_type_mismatch() {
        let mixed_rows = vec![
            vec![AttrValue::Int(7), AttrValue::Int(0)],
            vec![AttrValue::Int(8), AttrValue::Str("unknown".to_string())],
        ];
        let criteria = vec![Criterion {
            attribute: 1,
            op: CriterionOp::Gt,
            value: AttrValue::Int(1),
        }];
        let filtered = apply_criteria(&mixed_rows, &criteria);
        assert!(filtered.is_empty());
    }
}
