//! labdrop command-line entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use labdrop_lib::config::{self, IngestConfig};
use labdrop_lib::pipeline::ingest::run_batch;
use labdrop_lib::scheduler::{next_run_delay, start_scheduler};
use labdrop_lib::store::{LabRecordStore, SqliteLabStore};

#[derive(Parser, Debug)]
#[command(name = "labdrop")]
#[command(about = "Ingest laboratory result files from a watched directory")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LABDROP_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for relative paths when no configuration file is given
    #[arg(short, long, env = "LABDROP_ROOT", conflicts_with = "config")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every pending file once and print the run summary
    Run,
    /// Run periodically until interrupted
    Watch,
    /// Print the run log, newest first
    Log,
    /// Print the last run time and configured directories
    Status,
}

fn main() -> Result<()> {
    labdrop_lib::init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => IngestConfig::with_root(args.root.clone().unwrap_or_else(config::default_root_dir)),
    };
    tracing::info!(
        version = config::APP_VERSION,
        root = %config.root_dir.display(),
        "{} starting",
        config::APP_NAME
    );

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    match args.command {
        Command::Run => {
            let store = open_store(&config)?;
            let summary = run_batch(&store, &config).context("Ingestion run failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Watch => {
            let handle = start_scheduler(config);
            handle.join();
        }
        Command::Log => {
            let store = open_store(&config)?;
            let log = store.read_log().context("Failed to read run log")?;
            println!("{}", serde_json::to_string_pretty(&log)?);
        }
        Command::Status => {
            let store = open_store(&config)?;
            let last_run = store.last_run().context("Failed to read last run")?;
            let next_in = next_run_delay(
                last_run,
                chrono::Local::now().naive_local(),
                config.schedule_interval_secs,
            );
            let status = json!({
                "last_run": last_run,
                "next_run_in_secs": next_in.as_secs(),
                "watch_dir": config.watch_dir,
                "processed_dir": config.processed_dir(),
                "error_dir": config.error_dir(),
                "pdf_dest_dir": config.pdf_dest_dir,
                "database_path": config.database_path,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn open_store(config: &IngestConfig) -> Result<SqliteLabStore> {
    SqliteLabStore::open(&config.database_path).with_context(|| {
        format!("Failed to open record store {}", config.database_path.display())
    })
}
