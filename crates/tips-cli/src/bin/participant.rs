//! Real-network participant binary: waits on its ring socket, answers
//! each request in turn, and forwards every message to its own next
//! hop. `Information`/`Instruction` pass through unchanged once this
//! party's local contribution has been computed (submitting that
//! contribution to the `>k` oracle over `--motionport` is the external
//! MPC backend's job, out of scope here); `End` carries this party's
//! sealed rows, shuffled in with everything upstream.
//!
//! Grounded on `run_box.py::main`/`answer_request`.

use clap::Parser;
use tips_cli::dataset::BuiltinDataset;
use tips_cli::ingest;
use tips_participant::Participant;
use tips_transport::{PartyAddress, RingLink, RingMessage, TcpRingLink};

#[derive(Parser)]
struct Args {
    /// The id for this box.
    boxid: u32,
    /// Number of participating boxes, used for data splitting.
    number_of_boxes: usize,
    /// This box's ip address.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,
    /// This box's port for ring communication. Defaults to 4442 + boxid.
    #[arg(long)]
    ringport: Option<u16>,
    /// This box's port for oracle/MPC communication. Defaults to 5442 + boxid.
    #[arg(long)]
    motionport: Option<u16>,
    /// The data set to be used ([medical]/adult).
    #[arg(long, value_enum, default_value_t = BuiltinDataset::Medical)]
    dataset: BuiltinDataset,
    /// CSV file holding this box's share of the data.
    #[arg(long)]
    data: std::path::PathBuf,
    /// The coordinator's ip address, used by the last box in the ring.
    #[arg(long, default_value = "127.0.0.1")]
    central_address: String,
    /// The coordinator's ring port, used by the last box in the ring.
    #[arg(long, default_value_t = 4442)]
    central_ringport: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let ring_port = args.ringport.unwrap_or(4442 + args.boxid as u16);
    let motion_port = args.motionport.unwrap_or(5442 + args.boxid as u16);

    println!(
        "starting box ({}, {}, {}, {})",
        args.boxid, args.address, ring_port, motion_port
    );
    println!("reading data...");

    let full = ingest::read_csv(&args.data)?;
    let chunk_size = full.rows.len() / args.number_of_boxes.max(1);
    let start_row = (args.boxid as usize - 1) * chunk_size;
    let end_row = if args.boxid as usize == args.number_of_boxes {
        full.rows.len()
    } else {
        start_row + chunk_size
    };
    let my_rows = full.rows[start_row..end_row].to_vec();

    println!("finished reading data.");
    println!("\nWaiting for requests on port {ring_port}\n");

    let next = next_party_address(
        args.boxid,
        args.number_of_boxes,
        &args.central_address,
        args.central_ringport,
    );
    let link = TcpRingLink::new(
        format!("{}:{}", next.host, next.ring_port),
        format!("{}:{ring_port}", args.address),
    );

    let mut participant = Participant::new(my_rows);
    let mut rng = rand::thread_rng();

    loop {
        let request = link.recv().await?;
        match &request {
            RingMessage::Information { .. } => {
                let contribution = participant.on_information(&request)?;
                tracing::info!(groups = contribution.len(), "computed initial contribution");
                link.send(&request).await?;
            }
            RingMessage::Instruction { .. } => {
                let contribution = participant.on_instruction(&request)?;
                tracing::info!(groups = contribution.len(), "computed round contribution");
                link.send(&request).await?;
            }
            RingMessage::End { .. } => {
                let forwarded = participant.on_end(&request, &mut rng)?;
                link.send(&forwarded).await?;
                break;
            }
        }
    }

    Ok(())
}

/// The next hop in the ring: the box with the next-higher id, or the
/// coordinator (id 0) if this box is last. Mirrors `Box.__init__`'s
/// `next_party` lookup.
fn next_party_address(
    boxid: u32,
    number_of_boxes: usize,
    coordinator_address: &str,
    coordinator_ring_port: u16,
) -> PartyAddress {
    if boxid as usize == number_of_boxes {
        PartyAddress {
            id: 0,
            host: coordinator_address.to_string(),
            ring_port: coordinator_ring_port,
            motion_port: 0,
        }
    } else {
        PartyAddress {
            id: boxid + 1,
            host: "127.0.0.1".to_string(),
            ring_port: 4442 + boxid as u16 + 1,
            motion_port: 5442 + boxid as u16 + 1,
        }
    }
}
