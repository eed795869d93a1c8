//! Error types for bookdrop
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Delivery, Fetch, Database, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::ArtifactId;

/// Result type alias for bookdrop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bookdrop
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
        /// The configuration key that caused the error (e.g., "scoring.similarity_threshold")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Feed fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Delivery protocol error
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Unknown device or bad credential
    #[error("authentication failed for device {device_id}")]
    Auth {
        /// The device that failed to authenticate
        device_id: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Blob store error
    #[error("blob store error: {0}")]
    BlobStore(String),

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

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Feed fetch errors, classified by whether the next cycle should retry
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure or timeout; the source is retried next cycle
    #[error("transient fetch failure for source {source_id}: {reason}")]
    Transient {
        /// Source that failed
        source_id: String,
        /// Failure description
        reason: String,
    },

    /// The feed body could not be parsed as RSS or Atom
    #[error("malformed feed from source {source_id}: {reason}")]
    MalformedFeed {
        /// Source that produced the bad feed
        source_id: String,
        /// Parse failure description
        reason: String,
    },

    /// The feed endpoint answered with a non-success HTTP status
    #[error("source {source_id} returned HTTP {status}")]
    HttpStatus {
        /// Source that failed
        source_id: String,
        /// HTTP status code
        status: u16,
    },
}

impl FetchError {
    /// Whether the next aggregation cycle should try this source again
    ///
    /// Everything is retryable from the scheduler's point of view (a feed may
    /// be fixed upstream), but transient failures are logged at a lower level.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Delivery protocol errors surfaced to devices
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A delivery for this (device, artifact) pair is already streaming
    #[error("delivery of artifact {artifact_id} to device {device_id} is already in flight")]
    AlreadyInFlight {
        /// Device the delivery is for
        device_id: String,
        /// Artifact being delivered
        artifact_id: ArtifactId,
    },

    /// The pair has exhausted its attempt budget
    #[error("delivery of artifact {artifact_id} to device {device_id} abandoned after {attempts} attempts")]
    Abandoned {
        /// Device the delivery was for
        device_id: String,
        /// Artifact that was abandoned
        artifact_id: ArtifactId,
        /// Attempts made before abandoning
        attempts: u32,
    },

    /// The artifact was already delivered to this device
    #[error("artifact {artifact_id} already delivered to device {device_id}")]
    AlreadyDelivered {
        /// Device that already holds the artifact
        device_id: String,
        /// The delivered artifact
        artifact_id: ArtifactId,
    },

    /// A failed delivery is not yet eligible for retry
    #[error("artifact {artifact_id} for device {device_id} is backing off until {retry_at}")]
    BackoffPending {
        /// Device the delivery is for
        device_id: String,
        /// Artifact awaiting retry
        artifact_id: ArtifactId,
        /// Unix timestamp when the pair becomes eligible again
        retry_at: i64,
    },

    /// The operation does not apply in the pair's current state
    #[error("cannot {operation} for device {device_id}, artifact {artifact_id} in state {state}")]
    InvalidState {
        /// Device the delivery is for
        device_id: String,
        /// Artifact in question
        artifact_id: ArtifactId,
        /// Operation that was attempted (e.g., "report outcome")
        operation: String,
        /// Current state name
        state: String,
    },

    /// Session token is missing, expired, or unknown
    #[error("invalid or expired session token")]
    InvalidSession,
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
/// It follows a standard format with machine-readable error codes,
/// human-readable messages, and optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "already_in_flight",
///     "message": "delivery of artifact 7 to device kindle-1 is already in flight",
///     "details": {
///       "artifact_id": 7
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
    /// Machine-readable error code (e.g., "not_found", "already_in_flight")
    ///
    /// Clients can use this for programmatic error handling.
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

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps domain errors to appropriate HTTP status codes.
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

            // 401 Unauthorized - bad device credential or session
            Error::Auth { .. } => 401,
            Error::Delivery(DeliveryError::InvalidSession) => 401,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - state machine guard tripped
            Error::Delivery(DeliveryError::AlreadyInFlight { .. }) => 409,
            Error::Delivery(DeliveryError::AlreadyDelivered { .. }) => 409,
            Error::Delivery(DeliveryError::InvalidState { .. }) => 409,

            // 410 Gone - abandoned deliveries are not offered again
            Error::Delivery(DeliveryError::Abandoned { .. }) => 410,

            // 429 Too Early for a retry that is still backing off
            Error::Delivery(DeliveryError::BackoffPending { .. }) => 429,

            // 422 Unprocessable Entity - feed content problems
            Error::Fetch(FetchError::MalformedFeed { .. }) => 422,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::BlobStore(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - upstream feed errors
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Fetch(e) => match e {
                FetchError::Transient { .. } => "transient_fetch_error",
                FetchError::MalformedFeed { .. } => "malformed_feed",
                FetchError::HttpStatus { .. } => "feed_http_error",
            },
            Error::Delivery(e) => match e {
                DeliveryError::AlreadyInFlight { .. } => "already_in_flight",
                DeliveryError::Abandoned { .. } => "abandoned",
                DeliveryError::AlreadyDelivered { .. } => "already_delivered",
                DeliveryError::BackoffPending { .. } => "backoff_pending",
                DeliveryError::InvalidState { .. } => "invalid_state",
                DeliveryError::InvalidSession => "invalid_session",
            },
            Error::Auth { .. } => "auth_error",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::BlobStore(_) => "blob_store_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::Delivery(DeliveryError::AlreadyInFlight {
                device_id,
                artifact_id,
            }) => Some(serde_json::json!({
                "device_id": device_id,
                "artifact_id": artifact_id,
            })),
            Error::Delivery(DeliveryError::Abandoned {
                device_id,
                artifact_id,
                attempts,
            }) => Some(serde_json::json!({
                "device_id": device_id,
                "artifact_id": artifact_id,
                "attempts": attempts,
            })),
            Error::Delivery(DeliveryError::BackoffPending {
                device_id,
                artifact_id,
                retry_at,
            }) => Some(serde_json::json!({
                "device_id": device_id,
                "artifact_id": artifact_id,
                "retry_at": retry_at,
            })),
            Error::Delivery(DeliveryError::InvalidState {
                device_id,
                artifact_id,
                operation,
                state,
            }) => Some(serde_json::json!({
                "device_id": device_id,
                "artifact_id": artifact_id,
                "operation": operation,
                "state": state,
            })),
            Error::Auth { device_id } => Some(serde_json::json!({
                "device_id": device_id,
            })),
            Error::Fetch(FetchError::HttpStatus { source_id, status }) => {
                Some(serde_json::json!({
                    "source_id": source_id,
                    "status": status,
                }))
            }
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
