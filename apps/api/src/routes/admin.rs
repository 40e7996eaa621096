use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::audit::AuditQuery;
use crate::errors::AppError;
use crate::models::audit::AuditLogRow;
use crate::models::user::UserRole;
use crate::models::Page;
use crate::state::AppState;
use crate::tenancy::RequestScope;

#[derive(Deserialize)]
pub struct AuditLogFilter {
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<Uuid>,
}

/// GET /api/v1/admin/audit-logs
pub async fn handle_list_audit_logs(
    State(state): State<AppState>,
    scope: RequestScope,
    Query(filter): Query<AuditLogFilter>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AuditLogRow>>, AppError> {
    scope.require_role(&[UserRole::HrAdmin])?;
    let query = AuditQuery {
        entity_type: filter.entity_type,
        action: filter.action,
        user_id: filter.user_id,
        page,
        ..AuditQuery::for_org(scope.organization_id)
    };
    Ok(Json(state.audit.get_audit_logs(&query).await?))
}

/// GET /api/v1/admin/audit-logs/:id
pub async fn handle_get_audit_log(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditLogRow>, AppError> {
    scope.require_role(&[UserRole::HrAdmin])?;
    state
        .audit
        .get_audit_log(scope.organization_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Audit log {id} not found")))
}
