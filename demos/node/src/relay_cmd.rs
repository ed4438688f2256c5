//! The `relay` subcommand.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use meshtx_protocol::prelude::*;

use crate::link;

#[derive(Args)]
pub struct RelayArgs {
    /// Relay identity on the mesh
    #[arg(long, default_value = "!relay")]
    pub node_id: String,

    /// Bitcoin Core RPC endpoint
    #[arg(long, env = "MESHTX_RPC_URL", default_value = "http://127.0.0.1:8332")]
    pub rpc_url: String,

    /// RPC username
    #[arg(long, env = "MESHTX_RPC_USER", default_value = "")]
    pub rpc_user: String,

    /// RPC password
    #[arg(long, env = "MESHTX_RPC_PASSWORD", default_value = "", hide_env_values = true)]
    pub rpc_password: String,

    /// SOCKS5 proxy for hidden-service endpoints (e.g. socks5h://127.0.0.1:9050)
    #[arg(long, env = "MESHTX_SOCKS_PROXY")]
    pub socks_proxy: Option<String>,

    /// Seconds of inactivity before an unfinished session is dropped
    #[arg(long, default_value_t = 300)]
    pub reassembly_timeout_secs: u64,
}

pub async fn run(args: RelayArgs) -> anyhow::Result<()> {
    let rpc = BitcoinRpc::new(RpcConfig {
        url: args.rpc_url,
        user: args.rpc_user,
        password: args.rpc_password,
        socks_proxy: args.socks_proxy,
        ..RpcConfig::default()
    });

    let mut config = RelayConfig::new(args.node_id.as_str());
    config.reassembly_timeout = Duration::from_secs(args.reassembly_timeout_secs);

    let link = link::spawn(config.node_id.clone());
    let relay = Relay::new(config, link.outbound, Arc::new(rpc));

    relay.run(link.inbound).await?;
    Ok(())
}
