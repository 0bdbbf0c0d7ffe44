//! HTTP handlers for the ingestion API.
//!
//! Each ingest handler runs the same gate sequence before touching the
//! body: method, content type, rate limit, API key. Size is enforced while
//! reading the body, validation while parsing it, and a 2xx is issued only
//! after the sink's write (and therefore the fsync) returned success.

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::json;
use tracing::error;

use facthouse_core::{RequestFact, ServiceEvent, Topic};
use facthouse_observability::metrics::{INGESTION_BATCH_SIZE_BYTES, INGESTION_REQUESTS_TOTAL};

use crate::error::ApiError;
use crate::AppState;

/// Maximum accepted request body, single and batch alike.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Method / content-type / throttle / auth checks shared by every ingest
/// endpoint, in that order.
fn gate(state: &AppState, request: &Request) -> Result<(), ApiError> {
    if request.method() != Method::POST {
        return Err(ApiError::method_not_allowed());
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        return Err(ApiError::unsupported_media_type());
    }

    if !state.limiter.allow() {
        return Err(ApiError::too_many_requests());
    }

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());
    if !crate::auth::api_key_matches(state.api_key.as_deref(), provided) {
        return Err(ApiError::unauthorized());
    }

    Ok(())
}

async fn read_body(request: Request) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::payload_too_large())
}

fn count_request(path: &str, status: StatusCode) {
    INGESTION_REQUESTS_TOTAL
        .with_label_values(&[path, status.as_str()])
        .inc();
}

/// `POST /api/v1/facts` — one request fact, 201 on durable ack.
pub async fn ingest_fact(State(state): State<AppState>, request: Request) -> Response {
    let path = "/api/v1/facts";
    let outcome = async {
        gate(&state, &request)?;
        let body = read_body(request).await?;

        let fact = RequestFact::parse(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid RequestFact: {}", err)))?;
        let canonical = fact
            .to_canonical_json()
            .map_err(|_| ApiError::internal("failed to serialize fact"))?;

        state
            .sink
            .write(Topic::RequestFacts, &canonical)
            .await
            .map_err(|err| {
                error!(error = %err, "sink write failed");
                ApiError::internal("failed to persist fact")
            })?;

        INGESTION_BATCH_SIZE_BYTES
            .with_label_values(&[Topic::RequestFacts.as_str()])
            .observe(canonical.len() as f64);
        Ok::<_, ApiError>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            count_request(path, StatusCode::CREATED);
            StatusCode::CREATED.into_response()
        }
        Err(err) => {
            count_request(path, err.status());
            err.into_response()
        }
    }
}

/// `POST /api/v1/events` — one service event, 201 on durable ack.
pub async fn ingest_event(State(state): State<AppState>, request: Request) -> Response {
    let path = "/api/v1/events";
    let outcome = async {
        gate(&state, &request)?;
        let body = read_body(request).await?;

        let event = ServiceEvent::parse(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid ServiceEvent: {}", err)))?;
        let canonical = event
            .to_canonical_json()
            .map_err(|_| ApiError::internal("failed to serialize event"))?;

        state
            .sink
            .write(Topic::ServiceEvents, &canonical)
            .await
            .map_err(|err| {
                error!(error = %err, "sink write failed");
                ApiError::internal("failed to persist event")
            })?;

        INGESTION_BATCH_SIZE_BYTES
            .with_label_values(&[Topic::ServiceEvents.as_str()])
            .observe(canonical.len() as f64);
        Ok::<_, ApiError>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            count_request(path, StatusCode::CREATED);
            StatusCode::CREATED.into_response()
        }
        Err(err) => {
            count_request(path, err.status());
            err.into_response()
        }
    }
}

/// `POST /api/v1/facts/batch` — newline-delimited facts. Per-line
/// validation failures are collected and reported; a sink failure aborts
/// the whole request with 500.
pub async fn ingest_facts_batch(State(state): State<AppState>, request: Request) -> Response {
    let path = "/api/v1/facts/batch";
    let outcome = async {
        gate(&state, &request)?;
        let body = read_body(request).await?;

        let lines = split_jsonl(&body);
        if lines.is_empty() {
            return Err(ApiError::bad_request("empty request body"));
        }

        let mut accepted: u64 = 0;
        let mut errors: Vec<String> = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let fact = match RequestFact::parse(line) {
                Ok(fact) => fact,
                Err(err) => {
                    errors.push(format!("line {}: {}", index + 1, err));
                    continue;
                }
            };
            let canonical = match fact.to_canonical_json() {
                Ok(canonical) => canonical,
                Err(_) => {
                    errors.push(format!("line {}: serialization error", index + 1));
                    continue;
                }
            };
            state
                .sink
                .write(Topic::RequestFacts, &canonical)
                .await
                .map_err(|err| {
                    error!(error = %err, line = index + 1, "sink write failed mid-batch");
                    ApiError::internal("failed to persist facts")
                })?;
            accepted += 1;
        }

        INGESTION_BATCH_SIZE_BYTES
            .with_label_values(&[Topic::RequestFacts.as_str()])
            .observe(body.len() as f64);

        let mut response = json!({
            "accepted": accepted,
            "rejected": errors.len(),
        });
        if !errors.is_empty() {
            response["errors"] = json!(errors);
        }
        Ok::<_, ApiError>(Json(response))
    }
    .await;

    match outcome {
        Ok(body) => {
            count_request(path, StatusCode::OK);
            (StatusCode::OK, body).into_response()
        }
        Err(err) => {
            count_request(path, err.status());
            err.into_response()
        }
    }
}

/// Split a JSONL payload into its non-empty lines. A trailing newline is
/// optional.
fn split_jsonl(data: &[u8]) -> Vec<&[u8]> {
    data.split(|&byte| byte == b'\n')
        .filter(|line| !line.is_empty())
        .collect()
}

pub async fn live() -> &'static str {
    "up"
}

pub async fn ready(State(_state): State<AppState>) -> Response {
    // The router only exists once the sink has been constructed, which is
    // the readiness condition for accepting writes.
    (StatusCode::OK, "ready").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_jsonl_drops_empty_lines() {
        let lines = split_jsonl(b"{\"a\":1}\n\n{\"b\":2}\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], b"{\"a\":1}");
        assert_eq!(lines[1], b"{\"b\":2}");
    }

    #[test]
    fn split_jsonl_handles_missing_trailing_newline() {
        let lines = split_jsonl(b"{\"a\":1}\n{\"b\":2}");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn split_jsonl_empty_input() {
        assert!(split_jsonl(b"").is_empty());
        assert!(split_jsonl(b"\n\n").is_empty());
    }
}
