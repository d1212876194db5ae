//! Executor error types.

use cdcx_core::CoreError;
use cdcx_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Order submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Order status query failed: {0}")]
    StatusQuery(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Account not ready: {0}")]
    NotReady(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Rate error: {0}")]
    Rate(#[from] FeedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
