//! In-process request runner: drives one [`Coordinator`] and N
//! [`Participant`]s through a full request without any real ring
//! transport, calling each party's handler directly in turn.
//!
//! Grounded on `algorithm_utils.py::AlgorithmRunner.run_algorithm`,
//! which runs "in-place... just like it would happen in the
//! distributed setting" by having a shared callback stand in for the
//! ring socket. This port has no equivalent of a callback: each
//! party's `on_*`/`start_*`/`complete_*` method already returns its
//! outgoing message directly, so `run_request` simply threads that
//! value into the next call instead of stashing it on shared state.

use rand::rngs::ThreadRng;
use tips_coordinator::{Coordinator, CoordinatorConfig, OutputRow};
use tips_hierarchy::AttrValue;
use tips_oracle::InProcessOracle;
use tips_participant::Participant;
use tips_transport::RingMessage;
use tips_tree::counter::CounterGroup;

/// Run one request end to end in-process: `participant_rows[i]` is
/// participant `i + 1`'s raw data (the coordinator, party 0, never
/// holds raw rows).
pub async fn run_request(
    config: CoordinatorConfig,
    participant_rows: Vec<Vec<Vec<AttrValue>>>,
) -> anyhow::Result<Vec<OutputRow>> {
    let mut rng = ThreadRng::default();
    let mut coordinator = Coordinator::new(config, InProcessOracle::new(), &mut rng)?;
    let mut participants: Vec<Participant> = participant_rows.into_iter().map(Participant::new).collect();

    let info = coordinator.start_initial_round()?;
    let mut contributions = vec![coordinator.pending_groups()];
    for participant in &mut participants {
        contributions.push(participant.on_information(&info)?);
    }
    coordinator.complete_round(&contributions).await?;

    let mut rounds = 0u32;
    while coordinator.can_perform_round() {
        rounds += 1;
        let instruction = coordinator.start_round()?;

        let mut contributions: Vec<Vec<CounterGroup>> = vec![coordinator.pending_groups()];
        for participant in &mut participants {
            contributions.push(participant.on_instruction(&instruction)?);
        }
        coordinator.complete_round(&contributions).await?;
    }
    tracing::info!(rounds, "request converged");

    let mut end = coordinator.start_collection(&mut rng)?;
    for participant in &mut participants {
        end = participant.on_end(&end, &mut rng)?;
    }

    let RingMessage::End { rows } = end else {
        anyhow::bail!("collection did not end with an End message");
    };
    Ok(coordinator.complete_collection(rows)?)
}

/// Split `rows` into `number_of_boxes` contiguous chunks, the way
/// `run_box.py::main` slices `all_data[(box_id - 1) * box_data_range :
/// box_id * box_data_range]`.
pub fn split_rows(rows: Vec<Vec<AttrValue>>, number_of_boxes: usize) -> Vec<Vec<Vec<AttrValue>>> {
    if number_of_boxes == 0 {
        return Vec::new();
    }
    let chunk_size = rows.len() / number_of_boxes;
    let mut chunks: Vec<Vec<Vec<AttrValue>>> = Vec::with_capacity(number_of_boxes);
    let mut rest = rows;
    for i in 0..number_of_boxes {
        if i + 1 == number_of_boxes {
            chunks.push(rest);
            break;
        }
        let tail = rest.split_off(chunk_size.min(rest.len()));
        chunks.push(rest);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tips_hierarchy::HierarchyArena;
    use tips_transport::{Criterion, CriterionOp, PartyAddress};

    fn config(parties: u32) -> CoordinatorConfig {
        let mut age = HierarchyArena::new();
        let age_root = age.create_balanced_numerical_hierarchy(0, 7);
        let mut attrs = tips_hierarchy::QidAttributeSet::new();
        attrs.insert(1, (age, age_root));

        let mut parties_vec = vec![PartyAddress {
            id: 0,
            host: "127.0.0.1".into(),
            ring_port: 4442,
            motion_port: 5442,
        }];
        for i in 1..=parties {
            parties_vec.push(PartyAddress {
                id: i,
                host: "127.0.0.1".into(),
                ring_port: 4442 + i as u16,
                motion_port: 5442 + i as u16,
            });
        }

        CoordinatorConfig {
            k: 2,
            qid_attribute_set: attrs,
            criteria: vec![Criterion {
                attribute: 1,
                op: CriterionOp::Gt,
                value: AttrValue::Int(-1),
            }],
            parties: parties_vec,
        }
    }

    fn row(center: i64, age: i64) -> Vec<AttrValue> {
        vec![AttrValue::Int(center), AttrValue::Int(age)]
    }

    #[tokio::test]
    async fn full_demo_request_converges_to_a_k_anonymous_result() {
        let rows: Vec<Vec<AttrValue>> = (0..16).map(|i| row(i, i % 8)).collect();
        let participant_rows = split_rows(rows, 2);

        let result = run_request(config(2), participant_rows).await.unwrap();
        assert!(!result.is_empty());
        for output_row in &result {
            // [center marker, age label, count]
            assert_eq!(output_row[0], AttrValue::Str("*".to_string()));
            let count = match &output_row[2] {
                AttrValue::Int(n) => *n,
                _ => panic!("expected a count"),
            };
            assert!(count >= 2, "every surviving bucket must satisfy k=2");
        }
    }

    #[test]
    fn split_rows_covers_every_row_exactly_once() {
        let rows: Vec<Vec<AttrValue>> = (0..10).map(|i| row(i, i)).collect();
        let chunks = split_rows(rows, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 10);
    }
}
