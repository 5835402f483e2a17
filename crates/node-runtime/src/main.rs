//! # Secure Home Node
//!
//! Runs one device of the home network.
//!
//! ```text
//! node-runtime --config master.toml identity     # print (and create) the device id
//! node-runtime --config master.toml invite       # bootstrap text for a new device
//! node-runtime --config master.toml run          # listen for devices
//! node-runtime --config lamp.toml run            # connect to the master
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use node_runtime::{init_logging, LogConfig, Node, NodeConfig};
use shared_types::DeviceId;

/// Secure Home device runtime
#[derive(Parser, Debug)]
#[command(name = "node-runtime")]
#[command(version, about = "Secure Home device runtime")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run as master or client, per configuration
    Run,
    /// Master only: issue a registration token for a new device
    Invite {
        /// Pre-admit this device id and print a passive token instead
        #[arg(long, value_name = "DEVICE_ID")]
        passive: Option<String>,
    },
    /// Print this device's id, creating keys if missing
    Identity,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::from_env())?;

    let config = NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
    let node = Node::open(config)?;

    match args.command {
        Command::Identity => {
            let id = node.local_id();
            println!("{id}");
            println!("{}", id.to_short_text());
        }
        Command::Invite { passive: None } => {
            let info = node.invite()?;
            println!("{}", info.encode());
        }
        Command::Invite {
            passive: Some(device),
        } => {
            let device = DeviceId::from_text(&device).context("invalid device id")?;
            let token = node.invite_passive(device)?;
            println!("{}", token.to_base64());
        }
        Command::Run => run(&node).await?,
    }

    node.shutdown();
    Ok(())
}

async fn run(node: &Node) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Initiating graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    info!("Node is running. Press Ctrl+C to stop.");
    node.run(shutdown_rx).await
}
