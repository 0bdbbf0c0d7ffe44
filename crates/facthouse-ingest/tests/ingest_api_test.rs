//! Integration tests for the ingestion API.
//!
//! Builds a real router over a real sink (buffer + object store both in
//! temp directories) and drives it through tower's `oneshot`, asserting on
//! both the HTTP responses and the bytes that land in the buffer.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use facthouse_ingest::{create_router, AppState, DurableSink, RateLimiter, SinkConfig};
use facthouse_storage::LocalStore;

const VALID_FACT: &str = r#"{"event_id":"018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6b","event_time":"2025-01-15T10:30:05Z","service":"auth-service","method":"POST","path_template":"/login","status_code":200,"latency_ms":45}"#;
const VALID_EVENT: &str = r#"{"event_id":"018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6c","event_time":"2025-01-15T11:00:00Z","service":"deploy-service","event_type":"deploy_started"}"#;

struct TestHarness {
    buffer_dir: TempDir,
    _raw_dir: TempDir,
    sink: Arc<DurableSink>,
    app: axum::Router,
}

fn harness_with(api_key: Option<&str>, limiter: Arc<RateLimiter>) -> TestHarness {
    let buffer_dir = TempDir::new().unwrap();
    let raw_dir = TempDir::new().unwrap();
    let store = Arc::new(LocalStore::new(raw_dir.path()).unwrap());

    let sink = Arc::new(
        DurableSink::new(
            SinkConfig {
                buffer_dir: buffer_dir.path().to_path_buf(),
                rotate_interval: Duration::from_secs(3600),
            },
            store,
        )
        .unwrap(),
    );

    let app = create_router(AppState {
        sink: sink.clone(),
        limiter,
        api_key: api_key.map(|key| key.to_string()),
    });

    TestHarness {
        buffer_dir,
        _raw_dir: raw_dir,
        sink,
        app,
    }
}

fn harness() -> TestHarness {
    harness_with(None, RateLimiter::new(1000, 1000))
}

fn post(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn buffer_contents(harness: &TestHarness, topic: &str) -> String {
    std::fs::read_to_string(
        harness
            .buffer_dir
            .path()
            .join(topic)
            .join("current.jsonl"),
    )
    .unwrap_or_default()
}

// ---------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------

#[tokio::test]
async fn fact_is_acknowledged_and_buffered_once() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", VALID_FACT))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let contents = buffer_contents(&harness, "request_facts");
    let lines: Vec<&str> = contents.split_terminator('\n').collect();
    assert_eq!(lines.len(), 1);

    // The buffered line is the canonical serialization of the same record.
    let stored: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(stored["event_id"], "018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6b");
    assert_eq!(stored["status_code"], 200);
    harness.sink.close().await;
}

#[tokio::test]
async fn event_is_acknowledged_and_buffered() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/events", VALID_EVENT))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let contents = buffer_contents(&harness, "service_events");
    assert!(contents.contains("deploy_started"));
    harness.sink.close().await;
}

#[tokio::test]
async fn batch_reports_per_line_outcomes() {
    let harness = harness();
    let body = format!("{}\n{}\n", VALID_FACT, r#"{"service":"broken"}"#);

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts/batch", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["errors"].as_array().unwrap().len(), 1);
    assert!(json["errors"][0].as_str().unwrap().starts_with("line 2:"));

    let contents = buffer_contents(&harness, "request_facts");
    assert_eq!(contents.split_terminator('\n').count(), 1);
    harness.sink.close().await;
}

// ---------------------------------------------------------------
// Gate failures
// ---------------------------------------------------------------

#[tokio::test]
async fn wrong_method_is_405_with_structured_body() {
    let harness = harness();

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/facts")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let json = json_body(response).await;
    assert_eq!(json["code"], 405);
    harness.sink.close().await;
}

#[tokio::test]
async fn wrong_content_type_is_415() {
    let harness = harness();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/facts")
        .header("content-type", "text/plain")
        .body(Body::from(VALID_FACT))
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    harness.sink.close().await;
}

#[tokio::test]
async fn missing_required_field_is_400() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", r#"{"service":"broken"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["code"], 400);
    assert!(json["error"].as_str().unwrap().contains("missing field"));

    // Nothing was buffered.
    assert!(buffer_contents(&harness, "request_facts").is_empty());
    harness.sink.close().await;
}

#[tokio::test]
async fn invalid_event_type_is_400() {
    let harness = harness();
    let body = VALID_EVENT.replace("deploy_started", "DeployStarted");

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/events", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("snake_case"));
    harness.sink.close().await;
}

#[tokio::test]
async fn wrong_api_key_is_401_then_correct_key_succeeds() {
    let harness = harness_with(Some("letmein"), RateLimiter::new(1000, 1000));

    let mut request = post("/api/v1/facts", VALID_FACT);
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(buffer_contents(&harness, "request_facts").is_empty());

    let mut request = post("/api/v1/facts", VALID_FACT);
    request
        .headers_mut()
        .insert("x-api-key", "letmein".parse().unwrap());
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    harness.sink.close().await;
}

#[tokio::test]
async fn missing_api_key_is_401() {
    let harness = harness_with(Some("letmein"), RateLimiter::new(1000, 1000));

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", VALID_FACT))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    harness.sink.close().await;
}

#[tokio::test]
async fn oversize_body_is_413() {
    let harness = harness();
    let oversize = "x".repeat((1 << 20) + 1);

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", &oversize))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    harness.sink.close().await;
}

#[tokio::test]
async fn exhausted_rate_limit_is_429() {
    // Burst of 1 and no refill task: second request must be throttled.
    let harness = harness_with(None, RateLimiter::new(0, 1));

    let first = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", VALID_FACT))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", VALID_FACT))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let json = json_body(second).await;
    assert_eq!(json["code"], 429);
    harness.sink.close().await;
}

#[tokio::test]
async fn empty_batch_is_400() {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts/batch", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("empty"));
    harness.sink.close().await;
}

// ---------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------

#[tokio::test]
async fn liveness_and_readiness() {
    let harness = harness();

    for (path, expected) in [("/live", "up"), ("/ready", "ready")] {
        let response = harness
            .app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], expected.as_bytes());
    }
    harness.sink.close().await;
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    facthouse_observability::register_metrics();
    let harness = harness();

    // Generate at least one counted request first.
    let _ = harness
        .app
        .clone()
        .oneshot(post("/api/v1/facts", VALID_FACT))
        .await
        .unwrap();

    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ingestion_requests_total"));
    harness.sink.close().await;
}
