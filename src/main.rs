//! Shard lifecycle demo node
//!
//! Opens one index backed by in-memory subsystems, creates the configured
//! shards, optionally removes some, prints lifecycle metrics and closes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use shard_lifecycle::config::Config;
use shard_lifecycle::shard::{MemorySubsystemFactory, NodeShardLocks, ShardMetrics};
use shard_lifecycle::IndexService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shard-lifecycle")]
#[command(about = "Create and tear down the shards of one index", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "shard-lifecycle.toml")]
    config: PathBuf,

    /// Override the number of shards to create
    #[arg(short, long)]
    shards: Option<u32>,

    /// Shard ordinals to remove after creation
    #[arg(short, long, value_delimiter = ',')]
    remove: Vec<u32>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    info!("Starting shard-lifecycle v{}", shard_lifecycle::VERSION);

    // Load configuration
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        info!("No config file found, using default configuration");
        Config::default()
    };
    if let Some(shards) = args.shards {
        config.index.number_of_shards = shards;
    }
    config.validate()?;

    let metrics = Arc::new(ShardMetrics::new(&config.index.name)?);
    let locks = Arc::new(NodeShardLocks::new(config.node.data_dir.clone()));
    let service = IndexService::builder(
        config.index.clone(),
        locks,
        Arc::new(MemorySubsystemFactory::new()),
    )
    .listener(metrics.clone())
    .build()?;

    for ordinal in 0..config.index.number_of_shards {
        let shard = service.create_shard(ordinal)?;
        info!("Created shard {}", shard.shard_id());
    }
    info!(
        "Index {} ({}) has {} shards: {:?}",
        service.index(),
        service.index_uuid(),
        service.number_of_shards(),
        service.shard_ids()
    );

    for ordinal in &args.remove {
        service.remove_shard(*ordinal, "removed on request")?;
        info!("Removed shard {}", ordinal);
    }

    service.close("shutdown");
    info!("Index closed, {} shards remain", service.number_of_shards());

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.gather(), &mut buffer)?;
    print!("{}", String::from_utf8_lossy(&buffer));

    Ok(())
}
