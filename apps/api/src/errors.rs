use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generation::orchestrator::PipelineError;
use crate::models::club::ProfileError;

/// Failure returned by an upstream service (generative text or image search).
///
/// Split into transient (retryable) and permanent kinds via [`ServiceError::is_transient`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Authentication rejected (status {status})")]
    Auth { status: u16 },

    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Timeouts, transport failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_) | ServiceError::RateLimited { .. } | ServiceError::Upstream { .. }
        )
    }

    /// Maps a non-success HTTP status to the matching error kind.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ServiceError::Auth { status },
            429 => ServiceError::RateLimited { status },
            s if s >= 500 => ServiceError::Upstream { status, message },
            _ => ServiceError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Profile(e) => (StatusCode::BAD_REQUEST, "INVALID_PROFILE", e.to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CACHE_ERROR",
                    "A run-tracking error occurred".to_string(),
                )
            }
            AppError::Service(e) => {
                tracing::error!("Upstream service error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "An upstream AI service failed".to_string(),
                )
            }
            AppError::Pipeline(e) => {
                tracing::error!("Pipeline failed: {e}");
                (StatusCode::BAD_GATEWAY, "PIPELINE_FAILED", e.to_string())
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
