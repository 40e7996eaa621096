//! Leave approval. A plain (non-AI) mutation: the status change and its
//! before/after audit row commit in one transaction, or neither does.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditService, StateChange};
use crate::errors::AppError;
use crate::models::leave::LeaveRequestRow;
use crate::models::user::UserRole;
use crate::tenancy::RequestScope;

pub const DECIDER_ROLES: &[UserRole] = &[UserRole::HrAdmin, UserRole::HrStaff, UserRole::Manager];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "PENDING",
            LeaveStatus::Approved => "APPROVED",
            LeaveStatus::Rejected => "REJECTED",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(LeaveStatus::Pending),
            "APPROVED" => Some(LeaveStatus::Approved),
            "REJECTED" => Some(LeaveStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveDecision {
    Approve,
    Reject,
}

impl LeaveDecision {
    fn outcome(self) -> LeaveStatus {
        match self {
            LeaveDecision::Approve => LeaveStatus::Approved,
            LeaveDecision::Reject => LeaveStatus::Rejected,
        }
    }

    fn action(self) -> &'static str {
        match self {
            LeaveDecision::Approve => "leave.approve",
            LeaveDecision::Reject => "leave.reject",
        }
    }
}

/// Only pending requests can be decided.
pub fn next_status(current: &str, decision: LeaveDecision) -> Result<LeaveStatus, AppError> {
    match LeaveStatus::parse(current) {
        Some(LeaveStatus::Pending) => Ok(decision.outcome()),
        Some(done) => Err(AppError::Conflict(format!(
            "Leave request is already {}",
            done.as_str()
        ))),
        None => Err(AppError::Conflict(format!(
            "Leave request has unrecognized status '{current}'"
        ))),
    }
}

#[derive(Serialize)]
struct DecisionDetails<'a> {
    decision: LeaveDecision,
    employee_id: Uuid,
    comment: Option<&'a str>,
}

pub struct LeaveService {
    db: PgPool,
    scope: RequestScope,
}

impl LeaveService {
    pub fn new(db: PgPool, scope: RequestScope) -> Self {
        Self { db, scope }
    }

    pub async fn decide(
        &self,
        request_id: Uuid,
        decision: LeaveDecision,
        comment: Option<&str>,
    ) -> Result<LeaveRequestRow, AppError> {
        self.scope.require_role(DECIDER_ROLES)?;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        if decision == LeaveDecision::Reject && comment.is_none() {
            return Err(AppError::Validation(
                "A comment is required when rejecting a leave request".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let before: LeaveRequestRow = sqlx::query_as(
            "SELECT * FROM leave_requests WHERE id = $1 AND organization_id = $2 FOR UPDATE",
        )
        .bind(request_id)
        .bind(self.scope.organization_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Leave request {request_id} not found")))?;

        if before.employee_id == self.scope.user_id {
            return Err(AppError::Forbidden);
        }
        let status = next_status(&before.status, decision)?;

        let after: LeaveRequestRow = sqlx::query_as(
            r#"
            UPDATE leave_requests
            SET status = $1, approver_id = $2, approver_comment = $3, updated_at = NOW()
            WHERE id = $4 AND organization_id = $5
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(self.scope.user_id)
        .bind(comment)
        .bind(request_id)
        .bind(self.scope.organization_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::log_in_tx(
            &mut *tx,
            &self.scope,
            AuditRecord {
                action: decision.action(),
                entity_type: "leave_request",
                entity_id: Some(request_id),
                details: &DecisionDetails {
                    decision,
                    employee_id: before.employee_id,
                    comment,
                },
                state: Some(StateChange::transition(&before, &after)?),
                ai_recommended: false,
            },
        )
        .await?;

        tx.commit().await?;
        info!(
            "Leave request {request_id} set to {} by {}",
            status.as_str(),
            self.scope.user_id
        );
        Ok(after)
    }
}
