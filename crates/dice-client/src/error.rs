//! Error types for store client operations.

use std::io;
use thiserror::Error;

/// Result type for store client operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Transport-level failures raised by a store client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Notification source already terminated")]
    Terminated,

    #[error("Unsupported command: {0}")]
    Unsupported(String),
}

impl ConnectionError {
    /// Check if this error is transient.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectionError::Timeout | ConnectionError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        assert!(ConnectionError::Timeout.is_retryable());
    }

    #[test]
    fn test_io_is_retryable() {
        let err = ConnectionError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_closed_not_retryable() {
        assert!(!ConnectionError::Closed.is_retryable());
        assert!(!ConnectionError::Server("ERR wrong type".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ConnectionError::Unsupported("HSET".into());
        assert_eq!(err.to_string(), "Unsupported command: HSET");
    }
}
