//! The coordinator-side per-request state machine: the party that never
//! holds a raw record but drives the top-down specialization search and
//! the final encrypted collection.
//!
//! Grounded on `central.py`'s `Central` class — one instance per
//! request, holding a fresh HPKE keypair, the shared TIPS tree (with
//! every counter either `Undefined` or oracle-resolved), and the
//! decided best refinement for the round in flight. Gathering every
//! party's `>k` oracle contribution for a round (in the original, the
//! `motion` library's own job, addressed via each party's
//! `motion_port`) is left to this crate's caller: `complete_round`
//! expects the already-gathered contribution list, the same way
//! `Central.complete_round` expects `self._relevant_counter_groups` to
//! already hold its own round's shape.

mod error;

pub use error::{ProtocolError, Result};

use rand::{CryptoRng, RngCore};
use tips_crypto::{CoordinatorKeyPair, PublicKeyBytes, SealedRow};
use tips_hierarchy::{check_attribute_set_consistency, AttrValue, AttributeIndex, QidAttributeSet};
use tips_oracle::{PartyId, SumThresholdOracle};
use tips_transport::{Criterion, PartyAddress, RingMessage};
use tips_tree::counter::{groups_from, incorporate, node_ids_of, CounterGroup};
use tips_tree::{best_refinement, refine, setup_root, Arena, LinkHeads};

/// The coordinator's own party id in the roster (matches `Central.CENTRAL_ID`).
pub const CENTRAL_ID: PartyId = 0;

/// Smallest number of dummy rows injected at collection time.
pub const NR_DUMMIES_MIN: u32 = 1;
/// Largest number of dummy rows injected at collection time.
pub const NR_DUMMIES_MAX: u32 = 50;

/// Marker written to the first column of a dummy row, so
/// `complete_collection` can recognize and discard it.
pub const DUMMY_MARKER: &str = "DUMMY";

/// A generalized output row: `[center marker, label per QID attribute in
/// ascending index order, equivalence-class record count]`.
///
/// This is one row per converged TIPS leaf, not one row per original
/// record — a deliberate simplification of `anonymized_data`'s per-row
/// output: the per-attribute label and count is exactly what a
/// participant's own [`tips_tree::anonymous_result`] already produces,
/// and never requires sealing (and therefore exposing to the
/// coordinator) any non-QID column value.
pub type OutputRow = Vec<AttrValue>;

/// Static configuration for one anonymization request, fixed for its
/// whole lifetime (mirrors the constructor arguments of `Central`).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// The k-anonymity threshold.
    pub k: u64,
    /// Every QID attribute's generalization hierarchy.
    pub qid_attribute_set: QidAttributeSet,
    /// The request's filter criteria.
    pub criteria: Vec<Criterion>,
    /// The full roster, including the coordinator at id [`CENTRAL_ID`].
    pub parties: Vec<PartyAddress>,
}

impl CoordinatorConfig {
    fn validate(&self) -> Result<()> {
        let participant_count = self.parties.len().saturating_sub(1);
        if participant_count < 1 {
            return Err(ProtocolError::TooFewParties {
                party_count: self.parties.len(),
            });
        }
        let mut ids: Vec<u32> = self.parties.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        let ascending = ids
            .iter()
            .enumerate()
            .all(|(idx, &id)| id == idx as u32);
        if !ascending {
            return Err(ProtocolError::NonAscendingPartyIds);
        }
        Ok(())
    }
}

/// The coordinator's current position in the per-request protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Constructed, `start_initial_round` not yet called.
    Init,
    /// Waiting on this round's `>k` contributions.
    AwaitingCounters,
    /// Counters resolved; `can_perform_round`/`start_round` may be called.
    Deciding,
    /// `start_collection` issued; waiting on the shuffled ciphertext ring.
    Collecting,
    /// `complete_collection` returned the final result.
    Done,
}

impl CoordinatorState {
    fn name(self) -> &'static str {
        match self {
            CoordinatorState::Init => "Init",
            CoordinatorState::AwaitingCounters => "AwaitingCounters",
            CoordinatorState::Deciding => "Deciding",
            CoordinatorState::Collecting => "Collecting",
            CoordinatorState::Done => "Done",
        }
    }
}

/// One request's coordinator. Generic over the `>k` oracle backend so
/// tests can plug in [`tips_oracle::InProcessOracle`] while a real
/// deployment supplies its own.
pub struct Coordinator<O: SumThresholdOracle> {
    config: CoordinatorConfig,
    keypair: CoordinatorKeyPair,
    arena: Arena,
    link_heads: LinkHeads,
    best_refinement: Option<(AttributeIndex, String)>,
    oracle: O,
    state: CoordinatorState,
}

impl<O: SumThresholdOracle> Coordinator<O> {
    /// Construct a coordinator for a new request: validates the roster
    /// and every QID hierarchy, generates a fresh HPKE keypair, and
    /// seeds the shared TIPS tree with an all-`Undefined` root.
    pub fn new<R: RngCore + CryptoRng>(
        config: CoordinatorConfig,
        oracle: O,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        check_attribute_set_consistency(&config.qid_attribute_set)?;

        let keypair = CoordinatorKeyPair::generate(rng);
        let (arena, link_heads, _root_id) = setup_root(&config.qid_attribute_set, None);

        Ok(Self {
            config,
            keypair,
            arena,
            link_heads,
            best_refinement: None,
            oracle,
            state: CoordinatorState::Init,
        })
    }

    /// The current protocol state.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// The coordinator's public key, as sent over the wire.
    pub fn public_key_bytes(&self) -> PublicKeyBytes {
        self.keypair.public_key_bytes()
    }

    /// This round's `Undefined` counter groups — what every party must
    /// match the shape of when supplying contributions to
    /// [`Coordinator::complete_round`].
    pub fn pending_groups(&self) -> Vec<CounterGroup> {
        groups_from(&self.arena, true)
    }

    fn require_state(&self, expected: CoordinatorState) -> Result<()> {
        if self.state != expected {
            return Err(ProtocolError::WrongState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    /// Start the initial round: announce the request (criteria,
    /// hierarchies, public key, roster) and this round's pending node
    /// ids to the first ring hop. Mirrors `Central.start_initial_round`.
    pub fn start_initial_round(&mut self) -> Result<RingMessage> {
        self.require_state(CoordinatorState::Init)?;
        let pending_node_ids = node_ids_of(&self.pending_groups());
        tracing::info!(?pending_node_ids, "coordinator starting initial round");

        self.state = CoordinatorState::AwaitingCounters;
        Ok(RingMessage::Information {
            criteria: self.config.criteria.clone(),
            qid_attribute_set: self.config.qid_attribute_set.clone(),
            coordinator_public_key: self.public_key_bytes(),
            parties: self.config.parties.clone(),
            pending_node_ids,
        })
    }

    /// Complete the round in flight: invoke the `>k` oracle over the
    /// gathered contributions (one per party, including the
    /// coordinator's own all-`Undefined` shape), incorporate the
    /// resolved counters, and decide the next refinement (or `None` if
    /// the tree has converged). Mirrors `Central.complete_round`.
    pub async fn complete_round(&mut self, contributions: &[Vec<CounterGroup>]) -> Result<()> {
        self.require_state(CoordinatorState::AwaitingCounters)?;

        let resolved = self.oracle.evaluate(contributions, self.config.k).await?;
        incorporate(&mut self.arena, &resolved);

        self.best_refinement = best_refinement(
            &self.arena,
            &self.link_heads,
            &self.config.qid_attribute_set,
            self.config.k,
        );
        tracing::info!(next = ?self.best_refinement, "round complete");

        self.state = CoordinatorState::Deciding;
        Ok(())
    }

    /// True if another regular round should run (a refinement was
    /// found); false if the tree has converged and collection should
    /// start instead. Mirrors `Central.can_perform_round`.
    pub fn can_perform_round(&self) -> bool {
        self.best_refinement.is_some()
    }

    /// Perform the decided refinement locally and announce the new
    /// round's pending node ids. Mirrors `Central.start_round`.
    pub fn start_round(&mut self) -> Result<RingMessage> {
        self.require_state(CoordinatorState::Deciding)?;
        let (attr, label) = self
            .best_refinement
            .clone()
            .ok_or(ProtocolError::NoRefinementPending)?;

        refine(
            &mut self.arena,
            &mut self.link_heads,
            &self.config.qid_attribute_set,
            None,
            attr,
            &label,
        )?;

        let pending_node_ids = node_ids_of(&self.pending_groups());
        tracing::info!(?pending_node_ids, "coordinator starting regular round");

        self.state = CoordinatorState::AwaitingCounters;
        Ok(RingMessage::Instruction {
            pending_node_ids,
            best_attribute: attr,
            best_label: label,
        })
    }

    /// Start the final collection phase: generate a random number of
    /// dummy rows, seal them under the coordinator's own public key, and
    /// send them as the ring's seed `End` message. Mirrors
    /// `Central.start_secure_data_union`.
    pub fn start_collection<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<RingMessage> {
        self.require_state(CoordinatorState::Deciding)?;
        if self.can_perform_round() {
            return Err(ProtocolError::WrongState {
                expected: "Deciding (converged)",
                actual: "Deciding (refinement still pending)",
            });
        }

        let count = rng.next_u32() % (NR_DUMMIES_MAX - NR_DUMMIES_MIN + 1) + NR_DUMMIES_MIN;
        let num_attrs = self.config.qid_attribute_set.len();
        let mut rows = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut row: OutputRow = Vec::with_capacity(num_attrs + 2);
            row.push(AttrValue::Str(DUMMY_MARKER.to_string()));
            for col in 0..num_attrs {
                // The sort-key column (index 1 overall, compared against
                // by `complete_collection`) is drawn fresh per dummy row
                // so its position among the collected rows is scattered,
                // not predictable, per `central.py::_generate_dummies`'s
                // `row[1] = randint(0, 100)`.
                let value = if col == 0 { rng.next_u32() % 101 } else { 0 };
                row.push(AttrValue::Int(i64::from(value)));
            }
            row.push(AttrValue::Int(0));
            rows.push(tips_crypto::seal_row(&self.public_key_bytes(), &row, rng)?);
        }

        tracing::info!(dummies = rows.len(), "coordinator starting collection");
        self.state = CoordinatorState::Collecting;
        Ok(RingMessage::End { rows })
    }

    /// Complete collection: decrypt every sealed row, drop the dummies,
    /// and sort the remainder by the first QID attribute's label for a
    /// deterministic result order. Mirrors
    /// `Central.complete_secure_data_union`.
    pub fn complete_collection(&mut self, rows: Vec<SealedRow>) -> Result<Vec<OutputRow>> {
        self.require_state(CoordinatorState::Collecting)?;

        let mut result = Vec::with_capacity(rows.len());
        for sealed in &rows {
            let row: OutputRow = tips_crypto::open_row(&self.keypair, sealed)?;
            if row.first() == Some(&AttrValue::Str(DUMMY_MARKER.to_string())) {
                continue;
            }
            result.push(row);
        }

        result.sort_by(|a, b| match (a.get(1), b.get(1)) {
            (Some(x), Some(y)) => x.cmp_value(y),
            _ => std::cmp::Ordering::Equal,
        });

        self.state = CoordinatorState::Done;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tips_hierarchy::HierarchyArena;
    use tips_oracle::InProcessOracle;
    use tips_transport::{CriterionOp, PartyAddress};

    fn two_party_config() -> CoordinatorConfig {
        let mut age = HierarchyArena::new();
        let age_root = age.create_balanced_numerical_hierarchy(0, 3);
        let mut attrs = QidAttributeSet::new();
        attrs.insert(0, (age, age_root));

        CoordinatorConfig {
            k: 2,
            qid_attribute_set: attrs,
            criteria: vec![Criterion {
                attribute: 0,
                op: CriterionOp::Gt,
                value: AttrValue::Int(-1),
            }],
            parties: vec![
                PartyAddress {
                    id: 0,
                    host: "127.0.0.1".into(),
                    ring_port: 4442,
                    motion_port: 5442,
                },
                PartyAddress {
                    id: 1,
                    host: "127.0.0.1".into(),
                    ring_port: 4443,
                    motion_port: 5443,
                },
            ],
        }
    }

    #[test]
    fn rejects_roster_with_only_coordinator() {
        let mut config = two_party_config();
        config.parties.truncate(1);
        let mut rng = rand::thread_rng();
        let err = Coordinator::new(config, InProcessOracle::new(), &mut rng).unwrap_err();
        assert!(matches!(err, ProtocolError::TooFewParties { .. }));
    }

    #[tokio::test]
    async fn full_request_converges_and_collects() {
        let config = two_party_config();
        let mut rng = rand::thread_rng();
        let mut coordinator = Coordinator::new(config, InProcessOracle::new(), &mut rng).unwrap();

        let info = coordinator.start_initial_round().unwrap();
        let pending_ids = match info {
            RingMessage::Information {
                pending_node_ids, ..
            } => pending_node_ids,
            _ => panic!("expected Information"),
        };
        assert!(!pending_ids.is_empty());

        // Single participant contributes 10 records, split 5/5 by age
        // bucket: every child clears k=2.
        let coordinator_groups = coordinator.pending_groups();
        let mut participant_groups = coordinator_groups.clone();
        for group in &mut participant_groups {
            for counter in group.values_mut() {
                *counter = tips_tree::NodeCounter::DataContent(5);
            }
        }
        coordinator
            .complete_round(&[coordinator_groups, participant_groups])
            .await
            .unwrap();

        assert!(coordinator.can_perform_round());
        let instruction = coordinator.start_round().unwrap();
        assert!(matches!(instruction, RingMessage::Instruction { .. }));

        let coordinator_groups = coordinator.pending_groups();
        let mut participant_groups = coordinator_groups.clone();
        for group in &mut participant_groups {
            for counter in group.values_mut() {
                *counter = tips_tree::NodeCounter::DataContent(3);
            }
        }
        coordinator
            .complete_round(&[coordinator_groups, participant_groups])
            .await
            .unwrap();
        assert!(!coordinator.can_perform_round());

        let end = coordinator.start_collection(&mut rng).unwrap();
        let dummy_rows = match end {
            RingMessage::End { rows } => rows,
            _ => panic!("expected End"),
        };
        assert!(!dummy_rows.is_empty());

        let result = coordinator.complete_collection(dummy_rows).unwrap();
        assert!(result.is_empty(), "only dummy rows were ever injected");
        assert_eq!(coordinator.state(), CoordinatorState::Done);
    }
}
