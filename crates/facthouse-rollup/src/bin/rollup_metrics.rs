//! `rollup-metrics` — aggregate raw request facts into per-minute Parquet
//! metrics, one UTC day at a time.
//!
//! Modes:
//! - single day: `--process-time <RFC3339>` (default: now)
//! - backfill: `--start-day`/`--end-day` (inclusive, `YYYY-MM-DD`)
//!
//! The output directory doubles as the lock directory; a second concurrent
//! invocation fails fast with "already running". Exit code is non-zero if
//! any day fails after the lock was acquired.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use facthouse_rollup::{
    open_store, resolve_days, store_key_prefix, JobLock, MetricsRollup, METRICS_LOCK_FILE,
};

#[derive(Parser)]
#[command(name = "rollup-metrics", about = "Facthouse per-minute request metrics rollup", long_about = None)]
struct Args {
    /// Path to raw facts (JSONL)
    #[arg(long, default_value = "./data/raw/request_facts")]
    input_dir: String,

    /// Path to output metrics (Parquet)
    #[arg(long, default_value = "./data/warehouse/request_metrics_minute")]
    output_dir: String,

    /// Single day to process (RFC 3339; default: now)
    #[arg(long)]
    process_time: Option<String>,

    /// Start day for backfill (YYYY-MM-DD)
    #[arg(long)]
    start_day: Option<String>,

    /// End day for backfill (YYYY-MM-DD, inclusive)
    #[arg(long)]
    end_day: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    facthouse_observability::register_metrics();

    let args = Args::parse();

    let days = resolve_days(
        args.process_time.as_deref(),
        args.start_day.as_deref(),
        args.end_day.as_deref(),
    )?;
    info!(days = days.len(), "resolved days to process");

    let _lock = JobLock::acquire(Path::new(&args.output_dir), METRICS_LOCK_FILE)
        .context("cannot start rollup")?;

    let store = open_store(CancellationToken::new())?;
    let job = MetricsRollup::new(
        store,
        store_key_prefix(&args.input_dir),
        store_key_prefix(&args.output_dir),
    );

    for day in days {
        job.run_day(day)
            .await
            .with_context(|| format!("failed to process day {}", day))?;
    }

    info!("rollup complete");
    Ok(())
}
