//! Error types for the sink pipeline.
//!
//! Per-record problems (a malformed key) are not errors: they travel inside
//! the batch report as skip diagnostics. `SinkError` covers the failures that
//! abort a batch or a stream.

use thiserror::Error;

/// Result type alias for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that abort a batch submission or a stream.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the storage backend failed or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// Authentication against the storage backend failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Timeout waiting for the storage backend
    #[error("timeout: {0}")]
    Timeout(String),

    /// Record serialization/conversion error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend rejected the submission for a non-connectivity reason
    #[error("backend error: {0}")]
    Backend(String),
}

impl SinkError {
    /// Whether a layer above may reasonably retry the whole pipeline run.
    ///
    /// The sink itself never retries; this predicate exists for the caller's
    /// retry policy. Connectivity loss and timeouts qualify, bad config or
    /// bad data never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SinkError::connection("server selection timed out");
        assert_eq!(
            err.to_string(),
            "connection error: server selection timed out"
        );
        let err = SinkError::config("database name is empty");
        assert_eq!(err.to_string(), "configuration error: database name is empty");
    }

    #[test]
    fn test_retryable_check() {
        assert!(SinkError::connection("refused").is_retryable());
        assert!(SinkError::timeout("5s").is_retryable());
        assert!(!SinkError::config("bad config").is_retryable());
        assert!(!SinkError::auth("bad credentials").is_retryable());
        assert!(!SinkError::serialization("not a document").is_retryable());
        assert!(!SinkError::backend("duplicate key").is_retryable());
    }
}
