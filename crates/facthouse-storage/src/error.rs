//! Storage error types.
//!
//! Two categories matter to callers: *terminal* errors (`NotFound`,
//! `InvalidKey`) that retrying cannot fix, and transient backend failures
//! that the retry layer is allowed to re-attempt.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        StorageError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Terminal errors are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey { .. }
        )
    }
}
