use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::leave::LeaveRequestRow;
use crate::services::leave::{LeaveDecision, LeaveService};
use crate::state::AppState;
use crate::tenancy::RequestScope;

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub decision: LeaveDecision,
    pub comment: Option<String>,
}

/// POST /api/v1/leave/:id/decision
pub async fn handle_decide(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<LeaveRequestRow>, AppError> {
    let service = LeaveService::new(state.db.clone(), scope);
    let row = service
        .decide(id, req.decision, req.comment.as_deref())
        .await?;
    Ok(Json(row))
}
