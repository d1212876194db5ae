//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Artifact not found: {0}")]
    NotFound(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
