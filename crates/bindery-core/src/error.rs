use thiserror::Error;

use crate::path::PathError;
use crate::probe::ProbeError;
use crate::validate::ValidationErrors;

/// Application-wide error types for Bindery.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Missing or malformed configuration (environment, files).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Malformed path expression.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Resource configuration violates one or more constraints.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The endpoint probe failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The external sync job runner rejected or failed a call.
    #[error("Sync runner error (HTTP {status_code}): {message}")]
    RunnerError { message: String, status_code: u16 },

    /// Live tracking is at capacity for the configured poll policy.
    #[error("Sync tracking limit reached ({limit} targets)")]
    TrackingLimit { limit: usize },

    /// Referenced endpoint does not exist in the resource config.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Nothing in this crate retries; the classification is for callers
    /// that own a retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::RunnerError { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            AppError::Probe(e) => e.is_transient(),
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
