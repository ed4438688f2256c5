//! The `send` subcommand.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use meshtx_protocol::prelude::*;
use tokio::sync::watch;

use crate::link;

#[derive(Args)]
pub struct SendArgs {
    /// Destination relay identity
    #[arg(long)]
    pub dest: String,

    /// Our identity on the mesh
    #[arg(long, default_value = "!sender")]
    pub node_id: String,

    /// Raw transaction hex
    pub tx_hex: String,

    /// Hex characters per chunk
    #[arg(long, default_value_t = constants::CHUNK_HEX_CHARS)]
    pub chunk_size: usize,

    /// Seconds to wait for each chunk acknowledgment
    #[arg(long, default_value_t = 30)]
    pub ack_timeout_secs: u64,

    /// Print the chunk sequence without transmitting
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: SendArgs) -> anyhow::Result<ExitCode> {
    hex::decode(&args.tx_hex).context("transaction is not valid hex")?;
    anyhow::ensure!(args.chunk_size > 0, "chunk size must be positive");

    let session = SessionId::generate();
    let mut config = SenderConfig::new(args.node_id.as_str(), args.dest.as_str());
    config.chunk_hex_chars = args.chunk_size;
    config.ack_timeout = Duration::from_secs(args.ack_timeout_secs);

    if args.dry_run {
        return dry_run(&args, &session);
    }

    let mut link = link::spawn(config.node_id.clone());

    // Ctrl-C trips the abort flag; the driver unwinds at its next
    // blocking boundary and tells the relay.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = run_transfer(
        &config,
        &args.tx_hex,
        session,
        &link.outbound,
        &mut link.inbound,
        cancel_rx,
    )
    .await;

    Ok(report(outcome))
}

fn dry_run(args: &SendArgs, session: &SessionId) -> anyhow::Result<ExitCode> {
    let chunks = split_hex(&args.tx_hex, args.chunk_size);
    let total = u32::try_from(chunks.len()).context("transaction too large to chunk")?;
    anyhow::ensure!(total > 0, "empty transaction");

    for (offset, payload) in chunks.iter().enumerate() {
        let line = Message::Chunk {
            session: session.clone(),
            index: offset as u32 + 1,
            total,
            payload: payload.clone(),
        }
        .encode();
        println!("{line}");
    }
    eprintln!("dry run: {total} chunks for session {session}, nothing transmitted");
    Ok(ExitCode::SUCCESS)
}

/// Map each terminal outcome to its own exit code.
fn report(outcome: TransferOutcome) -> ExitCode {
    match outcome {
        TransferOutcome::Success { txid } => {
            println!("broadcast confirmed, txid {txid}");
            ExitCode::SUCCESS
        }
        TransferOutcome::Rejected { reason } => {
            eprintln!("broadcast rejected: {reason}");
            ExitCode::from(2)
        }
        TransferOutcome::PeerAborted { reason } => {
            eprintln!("relay aborted the session: {reason}");
            ExitCode::from(3)
        }
        TransferOutcome::NoAckAfterRetries => {
            eprintln!("no acknowledgment from the relay after retries");
            ExitCode::from(4)
        }
        TransferOutcome::NoFinalConfirmation => {
            eprintln!("chunks delivered but no broadcast confirmation arrived");
            ExitCode::from(5)
        }
        TransferOutcome::Cancelled => {
            eprintln!("transfer cancelled");
            ExitCode::from(6)
        }
    }
}
