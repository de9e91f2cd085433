//! The secure-sum `>k` oracle: the one point in the protocol where
//! several parties' private counts are combined into a single
//! threshold-gated answer without any party seeing another's raw input.
//!
//! Grounded on `motion.py`'s `perform_protocol_secure_sums_gt_k`, which
//! hands the real work off to an external MOTION (multiparty
//! computation) library over its `pandapython` binding. That library is
//! explicitly out of scope here (see spec.md's Non-goals): this crate
//! defines the trait boundary it would sit behind, plus an
//! [`InProcessOracle`] that computes the same masked-sum semantics
//! in-process for tests and single-machine simulation. It is not a
//! secure multiparty computation — every party's input is visible to
//! whatever process calls [`InProcessOracle::evaluate`] — and must never
//! be used where the parties do not already trust each other completely.

mod error;

pub use error::{OracleError, Result};

use async_trait::async_trait;
use std::collections::BTreeMap;
use tips_tree::{CounterGroup, NodeCounter, TipsNodeId};

/// Identifies one party in the protocol (its position in the ring).
pub type PartyId = u32;

/// A pluggable `>k` secure-sum backend.
///
/// `contributions[i]` is party `i`'s own [`CounterGroup`] list for this
/// round: the same group shape (same node ids, same grouping into
/// sibling sets) as every other party, differing only in each party's
/// local `DataContent` values. The returned list has the same shape,
/// with every counter now `Empty`, `BelowK`, or `Valid(total)` — never
/// `DataContent`, and never a raw sentinel integer.
#[async_trait]
pub trait SumThresholdOracle: Send + Sync {
    /// Evaluate one round of grouped secure sums against threshold `k`.
    async fn evaluate(
        &self,
        contributions: &[Vec<CounterGroup>],
        k: u64,
    ) -> Result<Vec<CounterGroup>>;
}

/// A semi-honest, single-process reference oracle.
///
/// Sums each group's per-id contributions directly in memory, applies
/// the `0 -> Empty`, `(0, k) -> BelowK`, `[k, ∞) -> Valid` mapping, then
/// the group-wide masking rule from `motion.py`'s doc comment: if any id
/// in a group lands on `BelowK`, every id in that group becomes
/// `BelowK`, so a below-threshold outcome never reveals which sibling
/// was the small one.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessOracle;

impl InProcessOracle {
    /// Construct a new in-process oracle. Stateless; there is nothing
    /// to configure.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SumThresholdOracle for InProcessOracle {
    async fn evaluate(
        &self,
        contributions: &[Vec<CounterGroup>],
        k: u64,
    ) -> Result<Vec<CounterGroup>> {
        if contributions.is_empty() {
            return Err(OracleError::NoContributions);
        }
        let group_count = contributions[0].len();

        let reference_keys: Vec<Vec<&TipsNodeId>> = contributions[0]
            .iter()
            .map(|g| g.keys().collect())
            .collect();
        for party in contributions.iter().skip(1) {
            if party.len() != group_count {
                return Err(OracleError::ShapeMismatch { group_index: 0 });
            }
            for (gi, group) in party.iter().enumerate() {
                let keys: Vec<&TipsNodeId> = group.keys().collect();
                if keys != reference_keys[gi] {
                    return Err(OracleError::ShapeMismatch { group_index: gi });
                }
            }
        }

        let mut output = Vec::with_capacity(group_count);
        for gi in 0..group_count {
            let mut totals: BTreeMap<TipsNodeId, u64> = BTreeMap::new();
            for party in contributions {
                for (id, counter) in &party[gi] {
                    *totals.entry(id.clone()).or_insert(0) += counter.count_or_zero();
                }
            }

            let mut resolved: CounterGroup = BTreeMap::new();
            let mut below_k_present = false;
            for (id, total) in totals {
                let counter = if total == 0 {
                    NodeCounter::Empty
                } else if total < k {
                    below_k_present = true;
                    NodeCounter::BelowK
                } else {
                    NodeCounter::Valid(total)
                };
                resolved.insert(id, counter);
            }
            if below_k_present {
                for v in resolved.values_mut() {
                    *v = NodeCounter::BelowK;
                }
            }
            output.push(resolved);
        }

        Ok(output)
    }
}

/// Integration seam for an external MPC backend (the real
/// `perform_arithmetic_then_bool_with_groups` call in `motion.py`).
/// Forwarding to an actual MOTION deployment is out of scope for this
/// workspace; this client exists so `tips-coordinator` can be written
/// against the trait without caring which backend eventually answers it.
#[derive(Debug)]
pub struct RemoteOracleClient {
    endpoint: String,
}

impl RemoteOracleClient {
    /// Point a client at a remote MPC coordinator endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SumThresholdOracle for RemoteOracleClient {
    async fn evaluate(
        &self,
        _contributions: &[Vec<CounterGroup>],
        _k: u64,
    ) -> Result<Vec<CounterGroup>> {
        Err(OracleError::NotImplemented(format!(
            "remote MPC backend at {} not wired up in this workspace",
            self.endpoint
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(entries: &[(&str, u64)]) -> CounterGroup {
        entries
            .iter()
            .map(|(id, n)| (id.to_string(), NodeCounter::DataContent(*n)))
            .collect()
    }

    #[tokio::test]
    async fn sums_across_parties_and_thresholds() {
        let oracle = InProcessOracle::new();
        let party_a = vec![group(&[("0.0:1|", 2), ("0.2:3|", 0)])];
        let party_b = vec![group(&[("0.0:1|", 3), ("0.2:3|", 1)])];

        let result = oracle.evaluate(&[party_a, party_b], 4).await.unwrap();
        assert_eq!(result.len(), 1);
        // "0.0:1|" totals 5 (>=k=4) -> Valid(5); "0.2:3|" totals 1 (<4, >0)
        // -> BelowK, which drags the whole group's "0.0:1|" down too.
        assert_eq!(result[0]["0.0:1|"], NodeCounter::BelowK);
        assert_eq!(result[0]["0.2:3|"], NodeCounter::BelowK);
    }

    #[tokio::test]
    async fn empty_total_stays_empty_without_group_contagion() {
        let oracle = InProcessOracle::new();
        let party_a = vec![group(&[("1.ANY|", 0), ("1.male|", 10)])];

        let result = oracle.evaluate(&[party_a], 3).await.unwrap();
        assert_eq!(result[0]["1.ANY|"], NodeCounter::Empty);
        assert_eq!(result[0]["1.male|"], NodeCounter::Valid(10));
    }

    #[tokio::test]
    async fn rejects_mismatched_group_shapes() {
        let oracle = InProcessOracle::new();
        let party_a = vec![group(&[("a", 1)])];
        let party_b = vec![group(&[("b", 1)])];

        let err = oracle.evaluate(&[party_a, party_b], 2).await.unwrap_err();
        assert!(matches!(err, OracleError::ShapeMismatch { group_index: 0 }));
    }
}
