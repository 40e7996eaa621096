use axum::{extract::State, http::header, response::IntoResponse};

use crate::errors::AppError;
use crate::state::AppState;

/// GET /metrics
/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
