//! Centralized error types for casesync.

use thiserror::Error;

/// Main error type for casesync operations.
#[derive(Error, Debug)]
pub enum CaseSyncError {
    #[error("Transient failure talking to {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    #[error("Endpoint {endpoint} rejected the request ({status}): {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed query results: {0}")]
    MalformedResults(String),

    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for casesync operations.
pub type CaseSyncResult<T> = Result<T, CaseSyncError>;

impl CaseSyncError {
    /// Create a transient error for the given endpoint.
    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed results error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResults(msg.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(CaseSyncError::transient("http://x/sparql", "timeout").is_transient());
        assert!(!CaseSyncError::Rejected {
            endpoint: "http://x/sparql".into(),
            status: 400,
            body: "bad query".into(),
        }
        .is_transient());
        assert!(!CaseSyncError::AlreadyRunning.is_transient());
    }
}
