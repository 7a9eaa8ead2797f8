//! Error types for the request layer.
//!
//! Every way a request can settle other than success is a variant of
//! [`RequestError`]. The variants follow the failure classes the pipeline
//! distinguishes: cancellation, retryable transport failures, HTTP status
//! failures and application-level failures reported inside the response body.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the request layer.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Superseded by a newer identical request, or bulk-cancelled on teardown.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("Network error after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: u32 },

    /// Transport-level failure carrying an HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend answered but reported a non-OK application code.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Non-retryable failure below the HTTP layer.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RequestError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RequestError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this is the silent cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }

    /// Check if this error class is eligible for a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Timeout { .. } | RequestError::Network { .. })
    }

    /// HTTP status for transport failures that carried one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend rejected the session (HTTP 401 or application code 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            RequestError::Http { status: 401, .. } | RequestError::Api { code: 401, .. }
        )
    }

    /// The message shown to the user when this error is surfaced.
    ///
    /// Returns `None` for cancellations, which are never surfaced.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            RequestError::Cancelled => return None,
            RequestError::Timeout { .. } => {
                "Request timed out, please check your network connection".to_string()
            }
            RequestError::Network { .. } => {
                "Network error, please check your network connection".to_string()
            }
            RequestError::Http { status, message } => match status {
                401 => "Unauthorized, please log in".to_string(),
                403 => "Access denied".to_string(),
                404 => "The requested resource does not exist".to_string(),
                500 => "Server error".to_string(),
                _ if !message.is_empty() => message.clone(),
                _ => "Request failed".to_string(),
            },
            RequestError::Api { message, .. } if !message.is_empty() => message.clone(),
            _ => "Request failed".to_string(),
        };
        Some(message)
    }
}
