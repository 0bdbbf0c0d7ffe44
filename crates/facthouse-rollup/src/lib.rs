//! Facthouse Rollup Engine
//!
//! Scheduled batch jobs that turn one UTC day of raw JSONL records into a
//! compact Parquet warehouse partition. Two parameterizations share the
//! same skeleton:
//!
//! - `MetricsRollup`: per-minute request metrics with latency percentiles
//! - `EventsRollup`: per-day service-event counts
//!
//! ## Run shape
//!
//! ```text
//! acquire lock → list raw/<topic>/<day>/ → stream-parse + dedup + filter
//!              → aggregate → encode Parquet → put new blob → delete old
//! ```
//!
//! Scanning tolerates malformed lines and unreadable blobs (logged,
//! skipped); errors writing or swapping the output abort the run with the
//! previous partition intact. The on-disk lock in the output directory
//! guarantees at most one writer per partition even when runs are started
//! by an external scheduler, and stale locks from dead processes are
//! cleared automatically.

pub mod columnar;
pub mod error;
pub mod events_job;
pub mod lock;
pub mod metrics_job;
pub mod scan;
pub mod stats;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::{Result, RollupError};
pub use events_job::{EventSummaryRow, EventsRollup};
pub use lock::{JobLock, EVENTS_LOCK_FILE, METRICS_LOCK_FILE};
pub use metrics_job::{DaySummary, MetricsRollup, MetricsRow};

use facthouse_storage::{BlobStore, LocalStore, S3Config, S3Store};

/// Resolve the UTC days a run covers: an inclusive `--start-day`/
/// `--end-day` range for backfill, else the day of `--process-time`
/// (default: now).
pub fn resolve_days(
    process_time: Option<&str>,
    start_day: Option<&str>,
    end_day: Option<&str>,
) -> Result<Vec<NaiveDate>> {
    if let (Some(start), Some(end)) = (start_day, end_day) {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")?;

        let mut days = Vec::new();
        let mut day = start;
        while day <= end {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        return Ok(days);
    }

    let instant = match process_time {
        Some(text) => DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc),
        None => Utc::now(),
    };
    Ok(vec![instant.date_naive()])
}

/// Map a data-directory flag to its object-store key prefix. The
/// operational layout roots local data at `./data`; object keys carry
/// everything below that.
pub fn store_key_prefix(dir: &str) -> String {
    let trimmed = dir.trim_start_matches("./");
    let trimmed = trimmed.strip_prefix("data/").unwrap_or(trimmed);
    trimmed.trim_end_matches('/').to_string()
}

/// Open the object store the environment selects: S3-compatible when
/// `S3_ENDPOINT` is set, else the local filesystem under `./data`.
pub fn open_store(cancel: CancellationToken) -> Result<Arc<dyn BlobStore>> {
    match std::env::var("S3_ENDPOINT") {
        Ok(endpoint) if !endpoint.is_empty() => {
            info!(endpoint = %endpoint, "initializing S3-compatible object store");
            Ok(Arc::new(S3Store::new(
                S3Config {
                    endpoint,
                    region: std::env::var("S3_REGION").unwrap_or_default(),
                    bucket: std::env::var("S3_BUCKET").unwrap_or_default(),
                    access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
                    secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
                },
                cancel,
            )?))
        }
        _ => {
            info!("initializing local object store at ./data");
            Ok(Arc::new(LocalStore::new("./data")?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_day_from_process_time() {
        let days = resolve_days(Some("2025-01-15T23:59:59Z"), None, None).unwrap();
        assert_eq!(days, vec![NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()]);
    }

    #[test]
    fn default_process_time_is_today() {
        let days = resolve_days(None, None, None).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0], Utc::now().date_naive());
    }

    #[test]
    fn backfill_range_is_inclusive() {
        let days = resolve_days(None, Some("2025-01-30"), Some("2025-02-02")).unwrap();
        let expected: Vec<NaiveDate> = ["2025-01-30", "2025-01-31", "2025-02-01", "2025-02-02"]
            .iter()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap())
            .collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn empty_range_when_start_after_end() {
        let days = resolve_days(None, Some("2025-02-02"), Some("2025-01-30")).unwrap();
        assert!(days.is_empty());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(resolve_days(Some("not-a-time"), None, None).is_err());
        assert!(resolve_days(None, Some("2025/01/01"), Some("2025-01-02")).is_err());
    }

    #[test]
    fn store_key_prefix_strips_data_root() {
        assert_eq!(
            store_key_prefix("./data/raw/request_facts"),
            "raw/request_facts"
        );
        assert_eq!(
            store_key_prefix("data/warehouse/request_metrics_minute"),
            "warehouse/request_metrics_minute"
        );
        assert_eq!(store_key_prefix("raw/request_facts/"), "raw/request_facts");
    }
}
