use thiserror::Error;

/// Application-wide error types for chorus.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required configuration is missing or malformed. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP request returned a non-success status or malformed body.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded (HTTP 429). Handled inside the client layer
    /// via cool-down and credential rotation.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Token exchange with the authenticated source failed.
    /// The caller must not proceed with the request.
    #[error("Auth error: {0}")]
    AuthError(String),

    /// Job arguments could not be decoded for the job's type. Permanent.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::AuthError(_) => true,
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
        assert!(AppError::Timeout(10).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(AppError::AuthError("token exchange failed".into()).is_retryable());
        assert!(!AppError::ConfigError("missing".into()).is_retryable());
        assert!(!AppError::InvalidJob("bad args".into()).is_retryable());
    }

    #[test]
    fn test_http_error_retryable_by_message() {
        assert!(AppError::HttpError("connect refused".into()).is_retryable());
        assert!(!AppError::HttpError("HTTP 404".into()).is_retryable());
    }
}
