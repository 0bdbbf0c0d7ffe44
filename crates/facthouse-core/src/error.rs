//! Error types for record parsing and validation.
//!
//! `ParseError` is what callers see from `RequestFact::parse` /
//! `ServiceEvent::parse`: either the JSON itself was malformed (which
//! includes missing required fields and unknown top-level fields, both
//! enforced by serde) or the decoded record violated a semantic rule.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Semantic rules a syntactically well-formed record can still break.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(&'static str),

    #[error("event_id must be a version 7 UUID (got v{0})")]
    NotUuidV7(usize),

    #[error("path_template must not contain query parameters")]
    PathQueryString,

    #[error("path_template appears to contain a raw UUID; use {{id}} placeholders")]
    PathRawUuid,

    #[error("path_template appears to contain a raw numeric ID; use {{id}} placeholders")]
    PathNumericSegment,

    #[error("status_code must be between 100 and 599 (got {0})")]
    StatusCodeOutOfRange(u16),

    #[error("event_type '{0}' must be snake_case")]
    EventTypeNotSnakeCase(String),

    #[error("property '{key}' value exceeds max length of {limit}")]
    PropertyValueTooLong { key: String, limit: usize },

    #[error("property '{0}' looks like nested JSON; properties must be flat strings")]
    PropertyNestedJson(String),
}
