//! `rollup-events` — aggregate raw service events into daily Parquet
//! summaries, one UTC day at a time.
//!
//! Same invocation surface and locking discipline as `rollup-metrics`,
//! with its own lock file so the two jobs can share an output volume.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use facthouse_rollup::{
    open_store, resolve_days, store_key_prefix, EventsRollup, JobLock, EVENTS_LOCK_FILE,
};

#[derive(Parser)]
#[command(name = "rollup-events", about = "Facthouse daily service events rollup", long_about = None)]
struct Args {
    /// Path to raw events (JSONL)
    #[arg(long, default_value = "./data/raw/service_events")]
    input_dir: String,

    /// Path to output summaries (Parquet)
    #[arg(long, default_value = "./data/warehouse/service_events_daily")]
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

    let _lock = JobLock::acquire(Path::new(&args.output_dir), EVENTS_LOCK_FILE)
        .context("cannot start event rollup")?;

    let store = open_store(CancellationToken::new())?;
    let job = EventsRollup::new(
        store,
        store_key_prefix(&args.input_dir),
        store_key_prefix(&args.output_dir),
    );

    for day in days {
        job.run_day(day)
            .await
            .with_context(|| format!("failed to process day {}", day))?;
    }

    info!("event rollup complete");
    Ok(())
}
