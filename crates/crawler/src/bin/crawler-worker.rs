//! crawler-worker — periodic fleet crawl and chaos schedule writer.
//!
//! Each trigger runs one crawl cycle: enumerate the configured resource
//! groups from the inventory snapshot, persist crawled machine and scale-set
//! state, and write the next randomized chaos schedule to the table store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use chaos_core::config::load_dotenv;
use chaos_core::Config;
use chaos_crawler::{CrawlOrchestrator, CycleReport, SnapshotInventory};
use chaos_storage::FileTableStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Chaos crawler worker — fleet crawling and schedule generation.
#[derive(Parser, Debug)]
#[command(name = "crawler-worker", version, about)]
struct Cli {
    /// Run a single cycle and exit (non-zero if anything failed).
    #[arg(long)]
    once: bool,

    /// Path to the JSON fleet snapshot.
    #[arg(long, env = "CHAOS_INVENTORY_PATH")]
    inventory: Option<PathBuf>,

    /// Directory holding the table store.
    #[arg(long, env = "CHAOS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between cycles.
    #[arg(long, env = "CHAOS_TRIGGER_INTERVAL_SECS")]
    interval: Option<u64>,

    /// Print each cycle report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.inventory {
        config.crawler.inventory_path = path;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(secs) = cli.interval {
        config.crawler.trigger_interval_secs = secs;
    }
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let inventory = Arc::new(SnapshotInventory::new(config.crawler.inventory_path.clone()));
    let store = Arc::new(
        FileTableStore::new(config.storage.data_dir.clone())
            .with_context(|| format!("opening table store in {}", config.storage.data_dir.display()))?,
    );
    let orchestrator = CrawlOrchestrator::new(config, inventory, store)?;
    let interval = orchestrator.config().crawler.trigger_interval();

    if cli.once {
        let report = orchestrator.run_cycle().await;
        emit(&report, cli.json)?;
        if report.has_failures() {
            std::process::exit(1);
        }
        return Ok(());
    }

    run_loop(orchestrator, interval, cli.json).await
}

/// Run cycles on a fixed interval until Ctrl-C. A cycle that overruns the
/// interval delays the next trigger instead of overlapping it.
async fn run_loop(orchestrator: CrawlOrchestrator, interval: Duration, json: bool) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "crawler-worker starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = orchestrator.run_cycle().await;
                if let Err(e) = emit(&report, json) {
                    error!(error = %e, "failed to emit cycle report");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("crawler-worker exited cleanly");
    Ok(())
}

fn emit(report: &CycleReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    }
    for failure in report.all_failures() {
        warn!(
            cycle_id = %report.cycle_id,
            resource_group = %failure.resource_group,
            stage = %failure.stage,
            partition_key = failure.partition_key.as_deref().unwrap_or("-"),
            records = failure.record_count,
            "{}",
            failure.message
        );
    }
    Ok(())
}
