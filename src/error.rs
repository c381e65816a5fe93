//! Error types for http-dl
//!
//! Errors are split by where they originate:
//! - [`TaskError`] for caller mistakes against the task state machine
//! - [`FetchError`] for failures inside a fetch attempt (these end up in `last_error`)
//! - [`Error`] wraps both plus configuration, I/O and API server failures
//!
//! [`ToHttpStatus`] and [`ApiError`] turn any of them into a JSON response body.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for http-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for http-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Download request rejected before a task was created
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Task lookup or state machine error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Fetch attempt failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the normal outcome of a stop request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Fetch(FetchError::Cancelled))
    }
}

/// Task-related errors returned synchronously to callers
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task with this id is registered
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: String,
    },

    /// Operation is not allowed in the task's current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidTransition {
        /// The task ID
        id: String,
        /// The operation that was attempted (e.g., "start", "retry", "remove")
        operation: String,
        /// The state that prevents the operation (e.g., "loading")
        current_state: String,
    },
}

/// Failures of a single fetch attempt
///
/// Everything except [`FetchError::Cancelled`] moves the task to `Failed`, and its
/// `Display` output becomes the task's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Proxy requested for a non-loopback target but none is configured
    #[error("proxy is requested for {url} but none is configured")]
    ProxyUnavailable {
        /// Target URL of the fetch
        url: String,
    },

    /// Configured proxy address could not be used
    #[error("invalid proxy address {address}: {reason}")]
    InvalidProxy {
        /// The configured proxy address
        address: String,
        /// Why the client rejected it
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP error: status {status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Server resumed from a different offset than requested
    #[error("range mismatch: requested offset {expected}, server sent {actual}")]
    RangeMismatch {
        /// Offset we asked for
        expected: u64,
        /// Offset the server's Content-Range started at
        actual: u64,
    },

    /// Destination file exists and overwriting is disabled
    #[error("destination {path} already exists")]
    DestinationExists {
        /// Destination path
        path: PathBuf,
    },

    /// Fetch was cancelled by a stop request
    #[error("fetch cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Http {
                status: status.as_u16(),
            },
            None => FetchError::Network(e.to_string()),
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "task error: task 1a2b3c4d not found",
///     "details": {
///       "task_id": "1a2b3c4d"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found", "invalid_transition")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (task_id, operation, status, path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 400,
            Error::Fetch(FetchError::InvalidProxy { .. }) => 400,

            // 404 Not Found
            Error::Task(TaskError::NotFound { .. }) => 404,

            // 409 Conflict - state machine or filesystem conflicts
            Error::Task(TaskError::InvalidTransition { .. }) => 409,
            Error::Fetch(FetchError::DestinationExists { .. }) => 409,
            Error::Fetch(FetchError::Cancelled) => 409,

            // 502 Bad Gateway - the remote side misbehaved
            Error::Fetch(FetchError::Http { .. }) => 502,
            Error::Fetch(FetchError::Network(_)) => 502,
            Error::Fetch(FetchError::RangeMismatch { .. }) => 502,

            // 503 Service Unavailable
            Error::Fetch(FetchError::ProxyUnavailable { .. }) => 503,
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Task(e) => match e {
                TaskError::NotFound { .. } => "task_not_found",
                TaskError::InvalidTransition { .. } => "invalid_transition",
            },
            Error::Fetch(e) => match e {
                FetchError::ProxyUnavailable { .. } => "proxy_unavailable",
                FetchError::InvalidProxy { .. } => "invalid_proxy",
                FetchError::Http { .. } => "http_error",
                FetchError::Network(_) => "network_error",
                FetchError::RangeMismatch { .. } => "range_mismatch",
                FetchError::DestinationExists { .. } => "destination_exists",
                FetchError::Cancelled => "cancelled",
            },
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Task(TaskError::NotFound { id }) => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::Task(TaskError::InvalidTransition {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "task_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Fetch(FetchError::Http { status }) => Some(serde_json::json!({
                "status": status,
            })),
            Error::Fetch(FetchError::DestinationExists { path }) => Some(serde_json::json!({
                "path": path,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
