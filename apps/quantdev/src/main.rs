//! quantdev - single-symbol tick research pipeline.
//!
//! Four commands form the loop:
//! - `data`   - ingest local aggTrades CSVs into the columnar store
//! - `build`  - derive streaming feature files for every stored day
//! - `study`  - score features against forward returns, IS vs OOS
//! - `sum`    - rank variants from a saved study report
//! - `sanity` - verify on-disk integrity (checksums, magics, sizes)

mod build;
mod config;
mod data;
mod sanity;
mod study;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quantdev")]
#[command(about = "Tick-level microstructure research pipeline")]
struct Cli {
    /// Optional JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    symbol: Option<String>,

    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Worker pool size (default: logical CPU count).
    #[arg(long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest aggTrades CSVs from <base>/incoming/<SYMBOL>/ into the store.
    Data,
    /// Build feature files for every stored day (idempotent).
    Build,
    /// Evaluate feature files against forward returns.
    Study,
    /// Rank variants from a saved study report at one horizon.
    Sum {
        /// Target horizon in milliseconds.
        #[arg(long, default_value_t = 60_000)]
        horizon_ms: i64,
    },
    /// Verify store integrity for every stored month.
    Sanity,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(symbol) = cli.symbol {
        cfg.symbol = symbol;
    }
    if let Some(base_dir) = cli.base_dir {
        cfg.base_dir = base_dir;
    }
    if let Some(workers) = cli.workers {
        cfg.worker_threads = workers;
    }

    // Config errors are the only fatal startup class.
    cfg.oos_boundary_ymd()
        .context("configuration rejected at startup")?;

    // Graceful stop: workers finish the current day, then drain.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            if stop.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            eprintln!("stopping after current jobs (press again to abort)");
        })
        .context("install signal handler")?;
    }

    let started = Instant::now();
    match cli.command {
        Command::Data => data::run(&cfg, &stop)?,
        Command::Build => build::run(&cfg, &stop)?,
        Command::Study => study::run(&cfg, &stop)?,
        Command::Sum { horizon_ms } => summary::run(&cfg, horizon_ms)?,
        Command::Sanity => sanity::run(&cfg)?,
    }
    info!(elapsed = ?started.elapsed(), "done");
    Ok(())
}
