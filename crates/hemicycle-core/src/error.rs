use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for hemicycle.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The remote answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Taxonomy data could not be loaded.
    #[error("Taxonomy error: {0}")]
    TaxonomyError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(
            AppError::UpstreamStatus {
                status: 503,
                url: "http://example.com".into(),
            }
            .is_retryable()
        );
        assert!(AppError::HttpError("connection reset by peer".into()).is_retryable());
        assert!(!AppError::ConfigError("bad".into()).is_retryable());
    }

    #[test]
    fn test_client_errors_are_final() {
        assert!(
            !AppError::UpstreamStatus {
                status: 404,
                url: "http://example.com/missing".into(),
            }
            .is_retryable()
        );
        assert!(!AppError::DatabaseError("disk full".into()).is_retryable());
    }
}
