#![forbid(unsafe_code)]
//! Runs a meshchain node: listener, bootstrap dials and optional miner loop.

use clap::Parser;
use meshchain::config::load_config_from;
use meshchain::node::Node;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mesh-node", about = "Run a meshchain node")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Additional bootstrap peers (ws://host:port), repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Enable the miner loop regardless of the configuration
    #[arg(long)]
    mine: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = load_config_from(&args.config)?;

    if let Some(port) = args.port {
        config.network.p2p_port = port;
    }
    config.network.bootstrap_peers.extend(args.peers);
    if args.mine {
        config.miner.enabled = true;
    }

    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}
