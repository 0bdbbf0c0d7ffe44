//! Facthouse Ingestion Service
//!
//! The write side of the pipeline: an HTTP API that authenticates,
//! rate-limits and validates incoming records, and a durable sink that
//! fsyncs them to a local buffer before acknowledging, then migrates
//! rotated batches to the object store in the background.
//!
//! ## Endpoints
//!
//! | Endpoint | Method | Success |
//! |---|---|---|
//! | `/api/v1/facts` | POST | 201 |
//! | `/api/v1/facts/batch` | POST | 200 `{accepted, rejected, errors?}` |
//! | `/api/v1/events` | POST | 201 |
//! | `/live`, `/ready`, `/metrics` | GET | 200 |
//!
//! All errors carry a structured JSON body `{"error": ..., "code": ...}`.
//!
//! ## Durability contract
//!
//! A 2xx response means the record's canonical serialization is on stable
//! storage in the topic's active buffer. Rotation and upload are
//! asynchronous; a crash at any point after the ack loses nothing.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{any, get};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use sink::{DurableSink, SinkConfig, SinkError};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<DurableSink>,
    pub limiter: Arc<RateLimiter>,
    /// `None` disables authentication.
    pub api_key: Option<String>,
}

/// Build the ingestion router. Ingest routes accept any method so the
/// handlers can answer non-POST requests with a structured 405 body.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/facts", any(handlers::ingest_fact))
        .route("/api/v1/facts/batch", any(handlers::ingest_facts_batch))
        .route("/api/v1/events", any(handlers::ingest_event))
        .route("/live", get(handlers::live))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(facthouse_observability::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}
