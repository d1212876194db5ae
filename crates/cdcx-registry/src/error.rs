//! Registry error types.

use cdcx_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Market data error: {0}")]
    Feed(#[from] FeedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<RegistryError> for FeedError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Feed(inner) => inner,
            RegistryError::Json(inner) => FeedError::Json(inner),
            RegistryError::HttpClient(msg) => FeedError::Network(msg),
        }
    }
}
