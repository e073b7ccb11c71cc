//! Treasure Node Binary
//!
//! Runs one node against the shared database until Ctrl+C.
//!
//! # Usage
//! ```bash
//! treasure-node [--config treasure-node.toml] [--database treasure_hunt.db] [--verbose] [--check]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use treasure_node::{LoggingExecutor, Node, NodeConfig, DEFAULT_CONFIG_FILE};

/// Treasure Node - shared reward markers with at-most-once claims
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); defaults apply if it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Database file, overriding the configuration
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Load the markers, print them and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    let mut config = if args.config.exists() {
        NodeConfig::from_file(&args.config)
            .with_context(|| format!("reading {}", args.config.display()))?
    } else {
        tracing::info!("{} not found, using defaults", args.config.display());
        NodeConfig::default()
    };
    if let Some(database) = args.database {
        config = config.with_database_path(database);
    }
    if args.check {
        config = config.with_sync_interval_secs(0);
    }
    config.validate().context("invalid configuration")?;

    let node = match Node::start(config, Arc::new(LoggingExecutor)).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Node failed to start: {}", e);
            return Err(e).context("starting node");
        }
    };

    if args.check {
        print_markers(&node).await?;
        node.shutdown().await;
        return Ok(());
    }

    print_banner(&node);
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    node.shutdown().await;
    Ok(())
}

async fn print_markers(node: &Node) -> Result<()> {
    let service = node.service();
    println!("{:<24} {:<32} {:>7}  action", "id", "location", "claims");
    for marker in service.all() {
        let claims = service
            .claim_count(marker.id())
            .await
            .with_context(|| format!("counting claims for {}", marker.id()))?;
        println!(
            "{:<24} {:<32} {:>7}  {}",
            marker.id(),
            marker.location().to_string(),
            claims,
            marker.action()
        );
    }
    println!("{} marker(s)", service.count());
    Ok(())
}

fn print_banner(node: &Node) {
    let config = node.config();
    println!();
    println!("Treasure Node v{}", treasure_node::VERSION);
    println!("   ├─ database       {}", config.database.path.display());
    println!(
        "   ├─ tables         {} / {}",
        config.database.tables.markers, config.database.tables.claims
    );
    match config.sync_interval() {
        Some(every) => println!("   ├─ sync           every {}s", every.as_secs()),
        None => println!("   ├─ sync           disabled"),
    }
    println!("   └─ markers        {}", node.service().count());
    println!();
    println!("Press Ctrl+C to stop the node");
    println!();
}
