//! Rollup error types.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RollupError>;

#[derive(Debug, Error)]
pub enum RollupError {
    #[error("rollup already running (lock file exists: {0})")]
    AlreadyRunning(PathBuf),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] facthouse_storage::StorageError),

    #[error("columnar encoding error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("invalid timestamp or day: {0}")]
    InvalidTime(#[from] chrono::ParseError),
}
