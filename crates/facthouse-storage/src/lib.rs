//! Facthouse Object Store Layer
//!
//! A small abstraction over flat keyed blob storage, with two backends:
//!
//! - `LocalStore`: keys map to files under a configured base directory.
//!   Used for development and single-host deployments. Keys are sanitized
//!   so they can never escape the base directory.
//! - `S3Store`: an S3-compatible service (AWS S3 or MinIO) via the
//!   `object_store` crate, with explicit retry + backoff on transient
//!   failures.
//!
//! ## Contract
//!
//! - `put` has replace semantics and buffers its input so retries are safe
//! - `get` streams the object and fails with `NotFound` if absent
//! - `delete` is idempotent: deleting an absent key succeeds
//! - `exists` distinguishes present / absent / error
//! - `list` walks a key prefix; ordering is unspecified
//!
//! "Not found" is terminal and never retried; everything else transient is
//! retried up to 3 times with exponential backoff and jitter, aborting
//! early on cancellation.

pub mod error;
pub mod local;
pub mod retry;
pub mod s3;
pub mod store;

pub use error::{Result, StorageError};
pub use local::LocalStore;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use s3::{S3Config, S3Store};
pub use store::{BlobStore, ByteStream};
