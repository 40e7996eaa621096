use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditError;
use crate::governance::GovernanceError;
use crate::orchestrator::AiError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// The audit row for an action could not be written, so the action is
    /// reported as failed.
    #[error("Audit write failed: {0}")]
    AuditFailed(#[from] AuditError),

    #[error("Governance error: {0}")]
    Governance(#[from] GovernanceError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests, try again later".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Ai(e) => {
                tracing::warn!("AI error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    e.code(),
                    "AI assistance is currently unavailable".to_string(),
                )
            }
            AppError::AuditFailed(e) => {
                tracing::error!("Audit write failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ACTION_FAILED",
                    "Action could not be completed".to_string(),
                )
            }
            AppError::Governance(GovernanceError::InvalidReview) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                GovernanceError::InvalidReview.to_string(),
            ),
            AppError::Governance(e) => {
                tracing::error!("Governance error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GOVERNANCE_ERROR",
                    "A governance error occurred".to_string(),
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
