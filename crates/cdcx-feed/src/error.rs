//! Feed error types.

use thiserror::Error;

/// Every variant is transient from the engine's point of view: the
/// affected candidate is skipped for the current cycle.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
