//! Audit Service: generic before/after-state audit trail.
//!
//! Used by AI-assisted and plain mutations alike. Rows are append-only and
//! always carry the organization of the request that wrote them; reads are
//! always filtered by organization.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgConnection;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::models::audit::AuditLogRow;
use crate::models::user::UserRole;
use crate::models::Page;
use crate::tenancy::RequestScope;

pub mod store;

pub use store::{insert_audit_row, AuditStore, PgAuditStore};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit details must serialize to a JSON object")]
    InvalidDetails,
}

/// Snapshot pair stored in `before_state` / `after_state`.
///
/// The columns are always written together. An entity that had no prior
/// state (an AI result, a creation) records an empty object as its before
/// snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Transition { before: Value, after: Value },
    Produced { after: Value },
}

impl StateChange {
    pub fn transition<B: Serialize + ?Sized, A: Serialize + ?Sized>(
        before: &B,
        after: &A,
    ) -> Result<Self, AuditError> {
        Ok(StateChange::Transition {
            before: serde_json::to_value(before)?,
            after: serde_json::to_value(after)?,
        })
    }

    pub fn produced<A: Serialize + ?Sized>(after: &A) -> Result<Self, AuditError> {
        Ok(StateChange::Produced {
            after: serde_json::to_value(after)?,
        })
    }

    /// `(before_state, after_state)` column values.
    pub fn columns(&self) -> (Value, Value) {
        match self {
            StateChange::Transition { before, after } => (before.clone(), after.clone()),
            StateChange::Produced { after } => (Value::Object(Map::new()), after.clone()),
        }
    }
}

/// Call-site description of one audited action. `details` must be a typed
/// structure that serializes to a JSON object.
pub struct AuditRecord<'a, D: Serialize + ?Sized> {
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<Uuid>,
    pub details: &'a D,
    pub state: Option<StateChange>,
    pub ai_recommended: bool,
}

/// A fully-resolved row ready for the store.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub organization_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub details: Map<String, Value>,
    pub state: Option<StateChange>,
    pub ai_recommended: bool,
}

impl NewAuditLog {
    pub fn build<D: Serialize + ?Sized>(
        scope: &RequestScope,
        record: AuditRecord<'_, D>,
    ) -> Result<Self, AuditError> {
        let details = match serde_json::to_value(record.details)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(AuditError::InvalidDetails),
        };
        Ok(Self {
            organization_id: scope.organization_id,
            action: record.action.to_string(),
            entity_type: record.entity_type.to_string(),
            entity_id: record.entity_id,
            user_id: scope.user_id,
            user_role: scope.role,
            details,
            state: record.state,
            ai_recommended: record.ai_recommended,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub organization_id: Uuid,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<Uuid>,
    pub page: Page,
}

impl AuditQuery {
    pub fn for_org(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            entity_type: None,
            action: None,
            user_id: None,
            page: Page::default(),
        }
    }
}

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Writes one audit row in its own statement. A failure is returned to
    /// the caller: an action without its audit row must not be reported as
    /// done.
    pub async fn log<D: Serialize + ?Sized>(
        &self,
        scope: &RequestScope,
        record: AuditRecord<'_, D>,
    ) -> Result<AuditLogRow, AuditError> {
        let entry = NewAuditLog::build(scope, record)?;
        let action = entry.action.clone();
        self.store.append(entry).await.map_err(|e| {
            error!("Audit write failed for action {action}: {e}");
            e
        })
    }

    /// Adds the audit row to the caller's open transaction. Commit is the
    /// caller's responsibility, which keeps the row atomic with the mutation
    /// it documents.
    pub async fn log_in_tx<D: Serialize + ?Sized>(
        conn: &mut PgConnection,
        scope: &RequestScope,
        record: AuditRecord<'_, D>,
    ) -> Result<AuditLogRow, AuditError> {
        let entry = NewAuditLog::build(scope, record)?;
        Ok(insert_audit_row(conn, &entry).await?)
    }

    pub async fn get_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditLogRow>, AuditError> {
        self.store.list(query).await
    }

    pub async fn get_audit_log(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditLogRow>, AuditError> {
        self.store.find(organization_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{scope, MemoryAuditStore};

    #[derive(Serialize)]
    struct DecisionDetails<'a> {
        decision: &'a str,
    }

    fn service() -> (AuditService, Arc<MemoryAuditStore>) {
        let store = Arc::new(MemoryAuditStore::default());
        (AuditService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_log_stores_scope_and_plain_role_string() {
        let (svc, store) = service();
        let scope = scope(UserRole::HrStaff);

        svc.log(
            &scope,
            AuditRecord {
                action: "approve_leave",
                entity_type: "leave_request",
                entity_id: Some(Uuid::new_v4()),
                details: &DecisionDetails { decision: "approved" },
                state: None,
                ai_recommended: false,
            },
        )
        .await
        .unwrap();

        let row = &store.rows()[0];
        assert_eq!(row.organization_id, scope.organization_id);
        assert_eq!(row.user_id, scope.user_id);
        assert_eq!(row.user_role, "HR_STAFF");
        assert_eq!(row.details, json!({"decision": "approved"}));
        assert!(row.before_state.is_none() && row.after_state.is_none());
    }

    #[tokio::test]
    async fn test_before_and_after_state_are_written_together() {
        let (svc, store) = service();
        let scope = scope(UserRole::HrAdmin);

        let written = svc
            .log(
                &scope,
                AuditRecord {
                    action: "update_leave_status",
                    entity_type: "leave_request",
                    entity_id: None,
                    details: &json!({}),
                    state: Some(
                        StateChange::transition(&json!({"status": "pending"}), &json!({"status": "approved"}))
                            .unwrap(),
                    ),
                    ai_recommended: false,
                },
            )
            .await
            .unwrap();

        let read = svc
            .get_audit_log(scope.organization_id, written.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.before_state, Some(json!({"status": "pending"})));
        assert_eq!(read.after_state, Some(json!({"status": "approved"})));
        assert!(store.rows().iter().all(|r| r.before_state.is_some() == r.after_state.is_some()));
    }

    #[test]
    fn test_produced_state_records_empty_before_snapshot() {
        let state = StateChange::produced(&json!({"score": 80})).unwrap();
        assert_eq!(state.columns(), (json!({}), json!({"score": 80})));
    }

    #[test]
    fn test_state_accepts_unsized_payloads() {
        let lines: &[&str] = &["a", "b"];
        let state = StateChange::produced(lines).unwrap();
        assert_eq!(state.columns().1, json!(["a", "b"]));

        let state = StateChange::transition("PENDING", "APPROVED").unwrap();
        assert_eq!(state.columns(), (json!("PENDING"), json!("APPROVED")));
    }

    #[tokio::test]
    async fn test_non_object_details_are_rejected() {
        let (svc, store) = service();
        let result = svc
            .log(
                &scope(UserRole::HrAdmin),
                AuditRecord {
                    action: "x",
                    entity_type: "y",
                    entity_id: None,
                    details: &vec![1, 2, 3],
                    state: None,
                    ai_recommended: false,
                },
            )
            .await;
        assert!(matches!(result, Err(AuditError::InvalidDetails)));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let svc = AuditService::new(Arc::new(MemoryAuditStore::failing()));
        let result = svc
            .log(
                &scope(UserRole::HrAdmin),
                AuditRecord {
                    action: "x",
                    entity_type: "y",
                    entity_id: None,
                    details: &json!({}),
                    state: None,
                    ai_recommended: false,
                },
            )
            .await;
        assert!(matches!(result, Err(AuditError::Database(_))));
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped_and_newest_first() {
        let (svc, _store) = service();
        let scope_a = scope(UserRole::HrAdmin);
        let scope_b = scope(UserRole::HrAdmin);
        for (s, action) in [(&scope_a, "first"), (&scope_b, "other"), (&scope_a, "second")] {
            svc.log(
                s,
                AuditRecord {
                    action,
                    entity_type: "document",
                    entity_id: None,
                    details: &json!({}),
                    state: None,
                    ai_recommended: false,
                },
            )
            .await
            .unwrap();
        }

        let rows = svc
            .get_audit_logs(&AuditQuery::for_org(scope_a.organization_id))
            .await
            .unwrap();
        let actions: Vec<&str> = rows.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["second", "first"]);
        assert!(rows.iter().all(|r| r.organization_id == scope_a.organization_id));

        let other = rows[0].id;
        assert!(svc
            .get_audit_log(scope_b.organization_id, other)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_filters_and_pagination() {
        let (svc, _store) = service();
        let s = scope(UserRole::HrAdmin);
        for (action, entity_type) in [("a", "leave_request"), ("b", "document"), ("a", "document")] {
            svc.log(
                &s,
                AuditRecord {
                    action,
                    entity_type,
                    entity_id: None,
                    details: &json!({}),
                    state: None,
                    ai_recommended: false,
                },
            )
            .await
            .unwrap();
        }

        let mut query = AuditQuery::for_org(s.organization_id);
        query.action = Some("a".to_string());
        assert_eq!(svc.get_audit_logs(&query).await.unwrap().len(), 2);

        query.entity_type = Some("document".to_string());
        assert_eq!(svc.get_audit_logs(&query).await.unwrap().len(), 1);

        let mut paged = AuditQuery::for_org(s.organization_id);
        paged.page = Page { limit: 2, offset: 2 };
        assert_eq!(svc.get_audit_logs(&paged).await.unwrap().len(), 1);

        let mut by_user = AuditQuery::for_org(s.organization_id);
        by_user.user_id = Some(Uuid::new_v4());
        assert!(svc.get_audit_logs(&by_user).await.unwrap().is_empty());
    }
}
