//! Chat-layer error types.

use dice_client::ConnectionError;
use thiserror::Error;

/// Result type for chat backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised by the chat backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    #[error("Store connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Backend is already registered")]
    AlreadyRegistered,

    #[error("Backend is not registered")]
    NotRegistered,

    #[error("Backend is closed")]
    Closed,

    #[error("Priming read interrupted: {0}")]
    PrimingInterrupted(String),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
