//! Daily service-event summary rollup.
//!
//! The event variant of the shared skeleton: same scan, dedup and
//! event-time filter as the metrics job, but grouped by
//! `(service, event_type)` for the whole day, with plain counts and no
//! percentiles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use facthouse_core::ServiceEvent;
use facthouse_observability::metrics::{
    ROLLUP_DURATION_SECONDS, ROLLUP_PROCESSED_EVENTS_TOTAL,
};
use facthouse_storage::BlobStore;

use crate::columnar;
use crate::error::Result;
use crate::metrics_job::DaySummary;
use crate::scan;

/// One output row: a day's count for a service/event_type pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummaryRow {
    pub event_day: String,
    pub service: String,
    pub event_type: String,
    pub event_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey {
    service: String,
    event_type: String,
}

pub struct EventsRollup {
    store: Arc<dyn BlobStore>,
    input_prefix: String,
    output_prefix: String,
}

impl EventsRollup {
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
        info!(prefix = %day_prefix, "processing service events");

        let mut counts: HashMap<EventKey, i64> = HashMap::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut summary = DaySummary::default();

        let keys = self.store.list(&day_prefix).await?;
        for key in keys {
            if !key.ends_with(".jsonl") {
                continue;
            }

            let scanned = scan::for_each_line(&*self.store, &key, |line| {
                let event = match ServiceEvent::parse(line.as_bytes()) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(key = %key, error = %err, "skipping invalid line");
                        summary.malformed_lines += 1;
                        return;
                    }
                };

                if !seen.insert(event.event_id) {
                    summary.duplicates_skipped += 1;
                    return;
                }
                if event.event_time.date_naive() != day {
                    summary.out_of_window += 1;
                    return;
                }

                *counts
                    .entry(EventKey {
                        service: event.service.clone(),
                        event_type: event.event_type.clone(),
                    })
                    .or_insert(0) += 1;

                summary.records_aggregated += 1;
                ROLLUP_PROCESSED_EVENTS_TOTAL
                    .with_label_values(&[&event.service, &day_str])
                    .inc();
            })
            .await;

            if let Err(err) = scanned {
                warn!(key = %key, error = %err, "skipping unreadable blob");
            }
        }

        if counts.is_empty() {
            self.clear_day_partition(&day_str, None).await;
            info!(day = %day_str, "no service events found, partition cleared");
            return Ok(summary);
        }

        let mut rows: Vec<EventSummaryRow> = counts
            .into_iter()
            .map(|(key, count)| EventSummaryRow {
                event_day: day_str.clone(),
                service: key.service,
                event_type: key.event_type,
                event_count: count,
            })
            .collect();
        rows.sort_by(|a, b| {
            (a.service.as_str(), a.event_type.as_str())
                .cmp(&(b.service.as_str(), b.event_type.as_str()))
        });
        summary.rows_written = rows.len();

        // Same swap discipline as the metrics job: new blob first, stale
        // blobs removed only once it is in place.
        let data = columnar::encode_events(&rows)?;
        let dest_key = format!(
            "{}/events_{}_{}.parquet",
            self.output_prefix,
            Uuid::new_v4(),
            day_str
        );
        self.store.put(&dest_key, data).await?;
        self.clear_day_partition(&day_str, Some(&dest_key)).await;

        ROLLUP_DURATION_SECONDS
            .with_label_values(&[&day_str])
            .set(started.elapsed().as_secs_f64());
        info!(rows = rows.len(), key = %dest_key, "uploaded event summary partition");
        Ok(summary)
    }

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
