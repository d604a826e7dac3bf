//! Tiered Cache - command line front end
//!
//! Operates on a disk-backed string cache, so values persist between runs.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::{CacheConfig, TieredCache};

#[derive(Parser)]
#[command(name = "tiered-cache")]
#[command(about = "Inspect and modify a persistent tiered cache")]
struct Args {
    /// Cache name (defaults to CACHE_NAME or "default")
    #[arg(short, long)]
    name: Option<String>,

    /// Cache root directory (defaults to CACHE_ROOT or the platform cache dir)
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a value
    Set {
        key: String,
        value: String,
        /// TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print a value
    Get { key: String },
    /// Remove a value
    Remove { key: String },
    /// Remove every value
    Clear,
    /// Print cache statistics
    Stats,
    /// Run a maintenance pass, purging expired entries
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "warn" so command output stays clean; override with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = CacheConfig::from_env()
        .with_disk_tier(true)
        .with_predictive_loading(false);
    if let Some(name) = args.name {
        config.name = name;
    }
    if let Some(root) = args.root {
        config = config.with_cache_root(root);
    }
    info!("Opening cache '{}' under {}", config.name, config.resolved_root().display());

    let cache: TieredCache<String, String> = TieredCache::new(config)
        .await
        .context("failed to open cache")?;

    match args.command {
        Command::Set { key, value, ttl } => {
            cache.set(key, value, ttl.map(Duration::from_secs)).await;
        }
        Command::Get { key } => match cache.get(&key).await {
            Some(value) => println!("{}", value),
            None => {
                cache.shutdown().await;
                anyhow::bail!("key not found: {}", key);
            }
        },
        Command::Remove { key } => cache.remove(&key).await,
        Command::Clear => cache.remove_all().await,
        Command::Stats => {
            let stats = cache.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Clean => {
            cache.run_maintenance().await;
            println!("{}", cache.stats().await.summary());
        }
    }

    cache.shutdown().await;
    Ok(())
}
