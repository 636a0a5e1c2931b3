//! Error types for featurewatch.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Malformed email address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Malformed address {0:?}: expected exactly one '@'")]
    Malformed(String),
}

/// Message construction and mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Message is incomplete: missing {0}")]
    Incomplete(&'static str),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Transport send failed: {0}")]
    SendFailed(String),
}

/// Task queue submission errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskQueueError {
    #[error("Failed to serialize task for {path}: {reason}")]
    Serialization { path: String, reason: String },

    #[error("Enqueue of {path} failed: {reason}")]
    EnqueueFailed { path: String, reason: String },

    #[error("Queue rejected {path} with status {status}")]
    Rejected { path: String, status: u16 },
}

/// Outbound mail task failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Lacking {0} header")]
    NotFromQueue(&'static str),

    #[error("Missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Staging redirect failed: {0}")]
    Address(#[from] AddressError),

    #[error("Message construction failed: {0}")]
    Construction(MailError),

    #[error("Mail transport failed: {0}")]
    Transport(MailError),
}

/// Bounce handling failures.
#[derive(Debug, thiserror::Error)]
pub enum BounceError {
    #[error("Bounce notification carries no original recipient")]
    MissingRecipient,

    #[error("No preference record resolvable for {0}")]
    NoPreference(String),

    #[error("Preference store failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Escalation email failed: {0}")]
    Escalation(MailError),
}

/// Inbound mail failures that must surface to the webhook caller.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to enqueue inbound reply: {0}")]
    Enqueue(#[from] TaskQueueError),
}

/// HTTP-facing error: a status code plus a short description.
///
/// Internal detail is logged where the error is created and never serialized.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Dependency(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Dependency(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        tracing::error!(error = %e, "Store failure");
        ApiError::Dependency("Storage unavailable".into())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFromQueue(_) => ApiError::Forbidden(e.to_string()),
            DispatchError::MissingParameter(_) => ApiError::BadRequest(e.to_string()),
            DispatchError::Address(_) | DispatchError::Construction(_) => {
                tracing::error!(error = %e, "Outbound email rejected");
                ApiError::BadRequest("Invalid email".into())
            }
            DispatchError::Transport(_) => {
                tracing::error!(error = %e, "Outbound email not sent");
                ApiError::Dependency("Mail transport failed".into())
            }
        }
    }
}

impl From<BounceError> for ApiError {
    fn from(e: BounceError) -> Self {
        tracing::error!(error = %e, "Bounce handling failed");
        match e {
            BounceError::MissingRecipient | BounceError::NoPreference(_) => {
                ApiError::Internal("Bounce could not be recorded".into())
            }
            BounceError::Database(_) => ApiError::Dependency("Storage unavailable".into()),
            BounceError::Escalation(_) => {
                ApiError::Dependency("Bounce escalation failed".into())
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        tracing::error!(error = %e, "Inbound email not forwarded");
        ApiError::Dependency("Task queue unavailable".into())
    }
}
