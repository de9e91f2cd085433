//! Single-process demo driver: runs a full request against a built-in
//! dataset with every coordinator and participant living in one
//! process, no ring sockets involved.
//!
//! Grounded on `algorithm_utils.py::AlgorithmRunner` (the original's own
//! in-process stand-in for the distributed ring, used by its
//! integration tests) rather than `run_central.py`/`run_box.py`'s
//! separate-process driver: a real deployment's `>k` oracle round-trips
//! through an external MOTION backend over each party's `motion_port`,
//! which is out of scope here (see `tips-oracle`'s module doc); running
//! true separate processes would block forever waiting on that
//! backend. `tips-coordinator-cli`/`tips-participant-cli` still expose
//! the real ring wire protocol for a deployment that supplies its own
//! oracle backend.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tips_cli::dataset::BuiltinDataset;
use tips_cli::{criteria, dataset, ingest, runner};
use tips_coordinator::CoordinatorConfig;
use tips_hierarchy::AttributeIndex;
use tips_transport::PartyAddress;

/// Run one TIPS anonymization request entirely in-process.
#[derive(Parser)]
struct Args {
    /// CSV file to anonymize (first column is treated as a center
    /// identifier and redacted on every matching row).
    #[arg(long)]
    data: PathBuf,

    /// Number of simulated participants to split the data across.
    #[arg(long, default_value_t = 3)]
    number_of_boxes: usize,

    /// The anonymity parameter k of k-anonymity.
    #[arg(long, default_value_t = 5)]
    anonymity_parameter: u64,

    /// The data set's built-in hierarchy definitions to use.
    #[arg(long, value_enum, default_value_t = BuiltinDataset::Medical)]
    dataset: BuiltinDataset,

    /// Comma-separated list, restricts the used QIDs to these indices.
    #[arg(long)]
    used_qids: Option<String>,

    /// Comma-separated criteria, e.g. "Age < 65,Sex = 1".
    #[arg(long)]
    criteria: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let definition = args.dataset.definition();
    let used_qids: Vec<AttributeIndex> = args
        .used_qids
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(|q| q.trim().parse::<AttributeIndex>())
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    let qid_attribute_set = dataset::restrict_to(definition.qid_attribute_set, &used_qids)?;
    let num_qids = qid_attribute_set.len();

    println!(
        "Starting central server [Number of boxes: {}, dataset: {:?}, k: {}, num_qids: {num_qids}]",
        args.number_of_boxes, args.dataset, args.anonymity_parameter
    );
    let used_qids_output: Vec<String> = qid_attribute_set.keys().map(|q| q.to_string()).collect();
    println!("Used QIDs: {}", used_qids_output.join(","));

    let criteria_list = match &args.criteria {
        Some(text) => criteria::parse_criteria_list(text, &definition.attribute_names)?,
        None => Vec::new(),
    };

    let mut parties = vec![PartyAddress {
        id: 0,
        host: "127.0.0.1".to_string(),
        ring_port: 4442,
        motion_port: 5442,
    }];
    for i in 1..=args.number_of_boxes as u32 {
        parties.push(PartyAddress {
            id: i,
            host: "127.0.0.1".to_string(),
            ring_port: 4442 + i as u16,
            motion_port: 5442 + i as u16,
        });
    }

    let config = CoordinatorConfig {
        k: args.anonymity_parameter,
        qid_attribute_set,
        criteria: criteria_list,
        parties,
    };

    let full_data = ingest::read_csv(&args.data)?;
    let participant_rows = runner::split_rows(full_data.rows, args.number_of_boxes);

    let start = Instant::now();
    let result = runner::run_request(config, participant_rows).await;
    let elapsed = start.elapsed();

    match result {
        Ok(rows) => {
            println!("FINISHED - time elapsed [{}]", tips_cli::format_elapsed(elapsed));
            println!("\nResult: ");
            for row in &rows {
                let formatted: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("  [{}]", formatted.join(", "));
            }
            println!("{} rows.", rows.len());
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "request failed");
            std::process::exit(2);
        }
    }
}
