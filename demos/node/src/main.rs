//! MESHTX operator node.
//!
//! Two roles over a line-oriented stdio link (the seam where a radio driver
//! attaches, see [`link`]):
//!
//! - `send`: transfer a raw transaction to a relay node
//! - `relay`: reassemble transfers and broadcast them over Bitcoin Core RPC
//!
//! Environment variables:
//! - MESHTX_RPC_URL: Bitcoin Core endpoint (relay only)
//! - MESHTX_RPC_USER / MESHTX_RPC_PASSWORD: RPC credentials (relay only)
//! - MESHTX_SOCKS_PROXY: SOCKS5 proxy for hidden-service endpoints
//! - RUST_LOG: log filter (e.g. `info`, `meshtx_protocol=debug`)

mod link;
mod relay_cmd;
mod send_cmd;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshtx-node", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a raw transaction to a relay node
    Send(send_cmd::SendArgs),
    /// Run the relay daemon
    Relay(relay_cmd::RelayArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Send(args) => send_cmd::run(args).await,
        Command::Relay(args) => relay_cmd::run(args).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
