//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Registry error: {0}")]
    Registry(#[from] cdcx_registry::RegistryError),

    #[error("Feed error: {0}")]
    Feed(#[from] cdcx_feed::FeedError),

    #[error("Detector error: {0}")]
    Detector(#[from] cdcx_detector::DetectorError),

    #[error("Executor error: {0}")]
    Executor(#[from] cdcx_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] cdcx_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] cdcx_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
