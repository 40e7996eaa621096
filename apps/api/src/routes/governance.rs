use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::governance::{GovernanceQuery, ReviewDecision};
use crate::models::governance::{AiDomain, EthicalAuditLogRow, ModelRegistryRow, ReviewStatus};
use crate::models::user::UserRole;
use crate::models::Page;
use crate::state::AppState;
use crate::tenancy::RequestScope;

#[derive(Deserialize)]
pub struct GovernanceLogFilter {
    pub domain: Option<AiDomain>,
    #[serde(default)]
    pub flagged_only: bool,
    pub review_status: Option<ReviewStatus>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub status: ReviewStatus,
    pub notes: Option<String>,
}

/// GET /api/v1/governance/logs
pub async fn handle_list_logs(
    State(state): State<AppState>,
    scope: RequestScope,
    Query(filter): Query<GovernanceLogFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<EthicalAuditLogRow>>, AppError> {
    scope.require_role(&[UserRole::HrAdmin])?;
    let query = GovernanceQuery {
        domain: filter.domain,
        flagged_only: filter.flagged_only,
        review_status: filter.review_status,
        page,
        ..GovernanceQuery::for_org(scope.organization_id)
    };
    Ok(Json(state.governance.list_logs(&query).await?))
}

/// PATCH /api/v1/governance/logs/:id/review
pub async fn handle_review_log(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<EthicalAuditLogRow>, AppError> {
    scope.require_role(&[UserRole::HrAdmin])?;
    let decision = ReviewDecision {
        reviewer_id: scope.user_id,
        status: req.status,
        notes: req.notes,
    };
    state
        .governance
        .review(scope.organization_id, id, &decision)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Governance log {id} not found")))
}

/// GET /api/v1/governance/models/:domain
pub async fn handle_active_model(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(domain): Path<String>,
) -> Result<Json<ModelRegistryRow>, AppError> {
    scope.require_role(&[UserRole::HrAdmin])?;
    let domain: AiDomain = domain.parse().map_err(AppError::Validation)?;
    state
        .governance
        .active_model(domain)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No active model for domain {domain}")))
}
