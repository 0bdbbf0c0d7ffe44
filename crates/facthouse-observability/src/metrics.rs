//! Metric definitions.
//!
//! Counters and histograms are declared once via `lazy_static` and
//! registered into a dedicated registry (not the process-global default)
//! by `register_metrics`, which is safe to call from multiple binaries and
//! tests.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};

static INIT: Once = Once::new();

lazy_static! {
    /// Registry gathered by the `/metrics` handler.
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Requests seen by the ingestion API, by path and response status.
    pub static ref INGESTION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ingestion_requests_total", "Total number of ingestion requests"),
        &["path", "status"]
    ).expect("metric can be created");

    /// Size of record payloads written to the buffer, by topic.
    pub static ref INGESTION_BATCH_SIZE_BYTES: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ingestion_batch_size_bytes",
            "Size of ingestion payloads written to disk"
        )
        .buckets(prometheus::exponential_buckets(100.0, 10.0, 6).unwrap()),
        &["topic"]
    ).expect("metric can be created");

    /// Duration of the fsync that gates every acknowledgement.
    pub static ref INGESTION_FSYNC_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ingestion_fsync_duration_seconds",
            "Duration of fsync operations"
        ),
        &["topic"]
    ).expect("metric can be created");

    /// Batch uploads to the object store, by topic and outcome.
    pub static ref SINK_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sink_uploads_total", "Batch uploads to the object store"),
        &["topic", "outcome"]
    ).expect("metric can be created");

    // ============================================================================
    // Rollup Metrics
    // ============================================================================

    /// Records accepted into an aggregation, by service and target day.
    pub static ref ROLLUP_PROCESSED_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "rollup_processed_events_total",
            "Total number of events processed by the rollup job"
        ),
        &["service", "day"]
    ).expect("metric can be created");

    /// Wall-clock duration of the last rollup run for a day.
    pub static ref ROLLUP_DURATION_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new("rollup_duration_seconds", "Duration of the rollup job in seconds"),
        &["day"]
    ).expect("metric can be created");
}

/// Register every metric into `REGISTRY`. Idempotent.
pub fn register_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INGESTION_REQUESTS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(INGESTION_BATCH_SIZE_BYTES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(INGESTION_FSYNC_DURATION_SECONDS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(SINK_UPLOADS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(ROLLUP_PROCESSED_EVENTS_TOTAL.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(ROLLUP_DURATION_SECONDS.clone()))
            .expect("collector can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        register_metrics();
        register_metrics();

        INGESTION_REQUESTS_TOTAL
            .with_label_values(&["/api/v1/facts", "201"])
            .inc();
        let families = REGISTRY.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ingestion_requests_total"));
    }
}
