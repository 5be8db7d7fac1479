//! Error types for biblio-translate
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Task, Provider, Database, Config)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for biblio-translate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for biblio-translate
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_tasks")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Task-related error (lookup, state transitions)
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Translation provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Network error outside of a translation request (client construction, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a domain value
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Task-related errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: String,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: String,
        /// The operation that was attempted (e.g., "pause", "resume", "reset")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// The task's execution is still live and the operation needs it stopped
    #[error("task {id} is still executing")]
    StillExecuting {
        /// The task ID
        id: String,
    },

    /// Provider configuration attached to a task is unusable
    #[error("invalid provider configuration: {reason}")]
    InvalidProviders {
        /// Why the provider list was rejected
        reason: String,
    },
}

/// Failure of a single request to a translation provider
///
/// Classified by [`crate::retry::IsRetryable`]: network failures, HTTP 429 and HTTP 5xx are
/// transient, everything else is terminal.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, reset, body read)
    #[error("{0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("{message}")]
    Http {
        /// HTTP status code returned by the provider
        status: u16,
        /// Provider error message, or a synthesized "HTTP {status}" message
        message: String,
    },

    /// 2xx response without a usable `choices[0].message.content`
    #[error("Invalid API response format")]
    MalformedResponse,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Network(e.to_string())
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "task error: task 2024-05-01/0007 not found",
///     "details": {
///       "task_id": "2024-05-01/0007"
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
    /// Machine-readable error code (e.g., "task_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
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

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
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
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Task(TaskError::InvalidProviders { .. }) => 400,

            // 404 Not Found
            Error::Task(TaskError::NotFound { .. }) => 404,

            // 409 Conflict - Operation not allowed in the current state
            Error::Task(TaskError::InvalidState { .. }) => 409,
            Error::Task(TaskError::StillExecuting { .. }) => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - External service errors
            Error::Provider(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Task(e) => match e {
                TaskError::NotFound { .. } => "task_not_found",
                TaskError::InvalidState { .. } => "invalid_state",
                TaskError::StillExecuting { .. } => "still_executing",
                TaskError::InvalidProviders { .. } => "invalid_providers",
            },
            Error::Provider(_) => "provider_error",
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Task(TaskError::NotFound { id }) | Error::Task(TaskError::StillExecuting { id }) => {
                Some(serde_json::json!({
                    "task_id": id,
                }))
            }
            Error::Task(TaskError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "task_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Config {
                key: Some(key), ..
            } => Some(serde_json::json!({
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
