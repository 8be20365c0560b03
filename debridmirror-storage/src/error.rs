//! Local store error types.

use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while persisting the local mirror.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}
