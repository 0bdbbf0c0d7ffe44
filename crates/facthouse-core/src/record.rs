//! Record types and their validation rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ValidationError};

/// Maximum byte length of a single `properties` value.
pub const MAX_PROPERTY_VALUE_LEN: usize = 1024;

lazy_static! {
    /// Standard 8-4-4-4-12 UUID anywhere in a path.
    static ref RAW_UUID: Regex = Regex::new(
        "[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}"
    )
    .unwrap();

    /// A path segment of four or more consecutive digits (e.g. /users/12345).
    /// Short numeric segments like /v1 are allowed.
    static ref RAW_NUMERIC_ID: Regex = Regex::new("/[0-9]{4,}").unwrap();

    static ref SNAKE_CASE: Regex = Regex::new("^[a-z]+(_[a-z0-9]+)*$").unwrap();
}

/// A logical stream of records of one type. The topic determines the
/// sink's buffer sub-directory and the raw object-store key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RequestFacts,
    ServiceEvents,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RequestFacts => "request_facts",
            Topic::ServiceEvents => "service_events",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed HTTP request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestFact {
    /// Version-7 (time-sortable) UUID; the deduplication key.
    pub event_id: Uuid,
    pub event_time: DateTime<Utc>,
    pub service: String,
    pub method: String,
    /// Route pattern, not the raw path: `/users/{id}`, never `/users/42187`.
    pub path_template: String,
    pub status_code: u16,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_family: Option<String>,
}

impl RequestFact {
    /// Decode and validate a raw JSON byte slice.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let fact: RequestFact = serde_json::from_slice(data)?;
        fact.validate()?;
        Ok(fact)
    }

    /// Enforce the semantic rules serde cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_event_id(&self.event_id)?;
        require_non_empty("service", &self.service)?;
        require_non_empty("method", &self.method)?;
        require_non_empty("path_template", &self.path_template)?;

        if self.path_template.contains('?') {
            return Err(ValidationError::PathQueryString);
        }
        if RAW_UUID.is_match(&self.path_template) {
            return Err(ValidationError::PathRawUuid);
        }
        if RAW_NUMERIC_ID.is_match(&self.path_template) {
            return Err(ValidationError::PathNumericSegment);
        }

        if self.status_code < 100 || self.status_code > 599 {
            return Err(ValidationError::StatusCodeOutOfRange(self.status_code));
        }

        Ok(())
    }

    /// Serialize to the canonical persisted form (stable field order,
    /// optional fields omitted when absent).
    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// A structured business or state-change event. Low volume, high value
/// (e.g. `deploy_started`, `cart_checkout`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEvent {
    pub event_id: Uuid,
    pub event_time: DateTime<Utc>,
    pub service: String,
    /// Must be snake_case; the rollup groups on this verbatim.
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Strictly flat key-value pairs; nested JSON is rejected.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl ServiceEvent {
    /// Decode and validate a raw JSON byte slice.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let event: ServiceEvent = serde_json::from_slice(data)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_event_id(&self.event_id)?;
        require_non_empty("service", &self.service)?;
        require_non_empty("event_type", &self.event_type)?;

        if !SNAKE_CASE.is_match(&self.event_type) {
            return Err(ValidationError::EventTypeNotSnakeCase(
                self.event_type.clone(),
            ));
        }

        for (key, value) in &self.properties {
            if value.len() > MAX_PROPERTY_VALUE_LEN {
                return Err(ValidationError::PropertyValueTooLong {
                    key: key.clone(),
                    limit: MAX_PROPERTY_VALUE_LEN,
                });
            }
            if looks_like_nested_json(value) {
                return Err(ValidationError::PropertyNestedJson(key.clone()));
            }
        }

        Ok(())
    }

    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn validate_event_id(id: &Uuid) -> Result<(), ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::EmptyField("event_id"));
    }
    let version = id.get_version_num();
    if version != 7 {
        return Err(ValidationError::NotUuidV7(version));
    }
    Ok(())
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

/// Heuristic: a value that is wrapped in `{}` or `[]` is suspected nested
/// JSON. Not a full parse, but catches the common smuggling cases.
fn looks_like_nested_json(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() <= 2 {
        return false;
    }
    (bytes[0] == b'{' && bytes[bytes.len() - 1] == b'}')
        || (bytes[0] == b'[' && bytes[bytes.len() - 1] == b']')
}
