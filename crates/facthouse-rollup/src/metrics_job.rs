//! Per-minute request-metrics rollup.
//!
//! One run covers one UTC day: it scans the day's raw `request_facts`
//! partition, deduplicates by `event_id`, filters on `event_time`,
//! aggregates per `(minute, service, method, path_template)` group, and
//! swaps the day's warehouse partition with a freshly written Parquet
//! blob. Re-running over identical input produces identical rows (the
//! blob's uuid differs, nothing else).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use facthouse_core::RequestFact;
use facthouse_observability::metrics::{
    ROLLUP_DURATION_SECONDS, ROLLUP_PROCESSED_EVENTS_TOTAL,
};
use facthouse_storage::BlobStore;

use crate::columnar;
use crate::error::Result;
use crate::scan;

/// One output row: a 1-minute bucket for a service/method/path tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub bucket_start: String,
    pub service: String,
    pub method: String,
    pub path_template: String,
    pub request_count: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub event_day: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    bucket_start: DateTime<Utc>,
    service: String,
    method: String,
    path_template: String,
}

#[derive(Debug, Default)]
struct GroupAgg {
    requests: i64,
    errors: i64,
    latencies: Vec<f64>,
}

/// Counters describing one day's run, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DaySummary {
    pub records_aggregated: u64,
    pub duplicates_skipped: u64,
    pub out_of_window: u64,
    pub malformed_lines: u64,
    pub rows_written: usize,
}

pub struct MetricsRollup {
    store: Arc<dyn BlobStore>,
    input_prefix: String,
    output_prefix: String,
}

impl MetricsRollup {
    pub fn new(
        store: Arc<dyn BlobStore>,
        input_prefix: impl Into<String>,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            input_prefix: input_prefix.into(),
            output_prefix: output_prefix.into(),
        }
    }

    /// Process one UTC day end to end.
    pub async fn run_day(&self, day: NaiveDate) -> Result<DaySummary> {
        let day_str = day.format("%Y-%m-%d").to_string();
        let day_prefix = format!("{}/{}", self.input_prefix, day_str);
        let started = Instant::now();
        info!(prefix = %day_prefix, "processing request metrics");

        let mut aggs: HashMap<GroupKey, GroupAgg> = HashMap::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut summary = DaySummary::default();

        let keys = self.store.list(&day_prefix).await?;
        for key in keys {
            if !key.ends_with(".jsonl") {
                continue;
            }

            let scanned = scan::for_each_line(&*self.store, &key, |line| {
                let fact = match RequestFact::parse(line.as_bytes()) {
                    Ok(fact) => fact,
                    Err(err) => {
                        warn!(key = %key, error = %err, "skipping invalid line");
                        summary.malformed_lines += 1;
                        return;
                    }
                };

                // Duplicate deliveries collapse here, once per run.
                if !seen.insert(fact.event_id) {
                    summary.duplicates_skipped += 1;
                    return;
                }

                // Strict day boundary on event time, not arrival time.
                if fact.event_time.date_naive() != day {
                    summary.out_of_window += 1;
                    return;
                }

                let group = GroupKey {
                    bucket_start: minute_bucket(fact.event_time),
                    service: fact.service.clone(),
                    method: fact.method.clone(),
                    path_template: fact.path_template.clone(),
                };
                let agg = aggs.entry(group).or_default();
                agg.requests += 1;
                if fact.status_code >= 500 {
                    agg.errors += 1;
                }
                agg.latencies.push(fact.latency_ms as f64);

                summary.records_aggregated += 1;
                ROLLUP_PROCESSED_EVENTS_TOTAL
                    .with_label_values(&[&fact.service, &day_str])
                    .inc();
            })
            .await;

            if let Err(err) = scanned {
                warn!(key = %key, error = %err, "skipping unreadable blob");
            }
        }

        if aggs.is_empty() {
            // Idempotency: clear stale output even when no new data.
            self.clear_day_partition(&day_str, None).await;
            info!(day = %day_str, "no data found, partition cleared");
            return Ok(summary);
        }

        let mut rows = finalize(aggs, &day_str);
        rows.sort_by(|a, b| {
            (a.bucket_start.as_str(), a.service.as_str())
                .cmp(&(b.bucket_start.as_str(), b.service.as_str()))
        });
        summary.rows_written = rows.len();

        // Write the new blob first, then delete old ones: a crash in
        // between leaves stale data readable instead of no data at all.
        let data = columnar::encode_metrics(&rows)?;
        let dest_key = format!(
            "{}/metrics_{}_{}.parquet",
            self.output_prefix,
            Uuid::new_v4(),
            day_str
        );
        self.store.put(&dest_key, data).await?;
        self.clear_day_partition(&day_str, Some(&dest_key)).await;

        ROLLUP_DURATION_SECONDS
            .with_label_values(&[&day_str])
            .set(started.elapsed().as_secs_f64());
        info!(
            rows = rows.len(),
            key = %dest_key,
            duplicates = summary.duplicates_skipped,
            malformed = summary.malformed_lines,
            "uploaded metrics partition"
        );
        Ok(summary)
    }

    /// Delete every blob for `day_str` under the output prefix except
    /// `keep`. Failures are logged and left for the next run; readers must
    /// tolerate an overlap window anyway.
    async fn clear_day_partition(&self, day_str: &str, keep: Option<&str>) {
        let existing = match self.store.list(&self.output_prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "could not list output partition for cleanup");
                return;
            }
        };
        for key in existing {
            if key.contains(day_str) && Some(key.as_str()) != keep {
                if let Err(err) = self.store.delete(&key).await {
                    warn!(key = %key, error = %err, "failed to delete stale partition blob");
                }
            }
        }
    }
}

fn finalize(aggs: HashMap<GroupKey, GroupAgg>, day_str: &str) -> Vec<MetricsRow> {
    let mut rows = Vec::with_capacity(aggs.len());
    for (key, mut agg) in aggs {
        agg.latencies.sort_by(|a, b| a.total_cmp(b));
        let error_rate = if agg.requests > 0 {
            agg.errors as f64 / agg.requests as f64
        } else {
            0.0
        };

        rows.push(MetricsRow {
            bucket_start: key.bucket_start.format("%Y-%m-%d %H:%M:%S").to_string(),
            service: key.service,
            method: key.method,
            path_template: key.path_template,
            request_count: agg.requests,
            error_count: agg.errors,
            error_rate,
            p50_latency_ms: crate::stats::percentile(&agg.latencies, 50.0),
            p95_latency_ms: crate::stats::percentile(&agg.latencies, 95.0),
            p99_latency_ms: crate::stats::percentile(&agg.latencies, 99.0),
            event_day: day_str.to_string(),
        });
    }
    rows
}

fn minute_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
