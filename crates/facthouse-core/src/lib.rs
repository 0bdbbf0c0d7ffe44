//! Facthouse Core Types
//!
//! This crate defines the two record shapes that flow through the pipeline
//! and the validation rules that gate them at ingest time.
//!
//! ## Record Model
//!
//! Both record types share a common envelope:
//!
//! - `event_id`: a version-7 (time-sortable) UUID, used downstream as the
//!   deduplication key
//! - `event_time`: the RFC 3339 UTC instant the event occurred
//! - `service`: a bounded-cardinality service identifier
//!
//! `RequestFact` describes one completed HTTP request (method, route
//! template, status, latency). `ServiceEvent` describes a lifecycle or
//! business signal (snake_case `event_type` plus flat string properties).
//!
//! The two types are deliberately sibling structs rather than variants of
//! one enum with shared machinery: the sink treats serialized bytes
//! opaquely and only validation cares about the concrete shape.
//!
//! ## Validation Philosophy
//!
//! Records are immutable facts; anything that would blow up cardinality or
//! nest structure is rejected at the front door:
//!
//! - raw UUIDs or long numeric IDs inside `path_template`
//! - query strings in `path_template`
//! - nested JSON smuggled into `properties` values
//! - unknown top-level fields (schema drift is an error, not a warning)

pub mod error;
pub mod record;

pub use error::{ParseError, ValidationError};
pub use record::{RequestFact, ServiceEvent, Topic};
