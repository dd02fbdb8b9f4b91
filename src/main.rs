use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hpcwatch::config::Settings;
use hpcwatch::{build_scheduler, SnapshotError, SnapshotReader};
use hpcwatch_cache::{CacheStore, FileStore, MemoryStore};

#[derive(Parser, Debug)]
#[command(name = "hpcwatch")]
#[command(about = "Telemetry aggregation cache for HPC cluster dashboards")]
#[command(version)]
struct Args {
    /// Path to a TOML config file. Environment variables prefixed with
    /// HPCWATCH__ override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warm every job, then refresh on schedule until Ctrl-C (default)
    Run,

    /// Run every job once and exit
    Once {
        /// Keep results in memory instead of the cache directory
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the cached snapshot for a key
    Show {
        key: String,
    },

    /// List every key the configured jobs write
    Keys,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&settings.log.level);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&settings).await,
        Command::Once { dry_run } => once(&settings, dry_run).await,
        Command::Show { key } => show(&settings, &key).await,
        Command::Keys => keys(&settings),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn file_store(settings: &Settings) -> Arc<dyn CacheStore> {
    Arc::new(FileStore::new(&settings.cache.dir))
}

async fn run(settings: &Settings) -> Result<()> {
    let scheduler = build_scheduler(settings, file_store(settings))?;
    info!(
        cache_dir = %settings.cache.dir.display(),
        jobs = scheduler.jobs().len(),
        "Starting hpcwatch"
    );

    let handle = scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down, waiting for job loops to stop");
    handle.shutdown().await;
    Ok(())
}

async fn once(settings: &Settings, dry_run: bool) -> Result<()> {
    let store: Arc<dyn CacheStore> = if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        file_store(settings)
    };
    let scheduler = build_scheduler(settings, store)?;

    let mut failed = 0;
    for (job, outcome) in scheduler.run_all_now().await {
        match outcome {
            Some(Ok(report)) => println!("{job}: wrote {}", report.written.join(", ")),
            Some(Err(e)) => {
                println!("{job}: {e}");
                failed += 1;
            }
            None => warn!(job = %job, "Job was already running"),
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} job(s) did not complete cleanly");
    }
    Ok(())
}

async fn show(settings: &Settings, key: &str) -> Result<()> {
    let reader = SnapshotReader::new(file_store(settings));

    match reader.read(key).await {
        Ok(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Err(SnapshotError::NotReady(key)) => {
            anyhow::bail!("'{key}' has not been written yet; is the daemon running?")
        }
        Err(e) => Err(e.into()),
    }
}

fn keys(settings: &Settings) -> Result<()> {
    // Building the warehouse pool needs a runtime but never connects here
    let scheduler = build_scheduler(settings, Arc::new(MemoryStore::new()))?;
    for (job, key) in scheduler.keys() {
        println!("{job:<10} {key}");
    }
    Ok(())
}
