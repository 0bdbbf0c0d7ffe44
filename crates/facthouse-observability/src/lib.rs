//! Facthouse Observability
//!
//! Process-level Prometheus metrics for the ingestion service and the
//! rollup jobs, plus an axum handler that serves the text exposition
//! format on `GET /metrics`.
//!
//! All metrics live in one crate so label names stay consistent across
//! binaries and the registry can be initialized exactly once.

pub mod exporter;
pub mod metrics;

pub use exporter::metrics_handler;
pub use metrics::{register_metrics, REGISTRY};
