//! Detector error types.

use cdcx_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Insufficient liquid markets for {currency}: {liquid} < 2")]
    InsufficientLiquidity { currency: String, liquid: usize },

    #[error("Data unavailable: {0}")]
    DataUnavailable(#[from] FeedError),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
