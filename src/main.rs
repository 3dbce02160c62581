//! Gallery-Harvest main entry point
//!
//! This is the command-line interface for the Gallery-Harvest crawler.

use anyhow::Context;
use clap::Parser;
use gallery_harvest::config::{load_config_with_hash, Config};
use gallery_harvest::crawler::{crawl, RunOutcome};
use gallery_harvest::output::{load_statistics, print_run_summary, print_statistics};
use gallery_harvest::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Gallery-Harvest: an incremental gallery crawler
///
/// Discovers collections through the site's tag listings, records them in
/// a local database and downloads their images. Re-running only fetches
/// what is new or unfinished.
#[derive(Parser, Debug)]
#[command(name = "gallery-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental gallery crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Clear every download-complete flag and exit
    #[arg(long, conflicts_with = "stats")]
    reset_downloads: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "reset_downloads")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    setup_logging(cli.verbose, cli.quiet, config.logging.debug);
    tracing::info!(
        path = %cli.config.display(),
        hash = %config_hash,
        "Configuration loaded"
    );

    if cli.reset_downloads {
        handle_reset(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool, debug: bool) {
    let default_filter = if quiet {
        "error"
    } else {
        match verbose.max(u8::from(debug)) {
            0 => "gallery_harvest=info,warn",
            1 => "gallery_harvest=debug,info",
            2 => "gallery_harvest=trace,debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.storage.database_path);
    SqliteStorage::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Handles --reset-downloads: marks every collection as not downloaded
fn handle_reset(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let reset = storage.reset_download_flags()?;
    tracing::info!(collections = reset, "Download flags cleared");
    println!("Reset {} collections to not downloaded", reset);
    Ok(())
}

/// Handles --stats: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);
    let storage = open_storage(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        site = %config.site.base_url,
        number_workers = config.workers.number,
        info_workers = config.workers.info,
        download_workers = config.workers.download,
        "Starting crawl"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    match crawl(config, cancel).await {
        Ok(summary) => {
            match summary.outcome {
                RunOutcome::Completed => tracing::info!("Crawl completed successfully"),
                RunOutcome::Interrupted => tracing::info!("Crawl interrupted, progress saved"),
            }
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Crawl failed");
            Err(e.into())
        }
    }
}
