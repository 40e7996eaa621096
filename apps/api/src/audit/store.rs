use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{AuditError, AuditQuery, NewAuditLog};
use crate::models::audit::AuditLogRow;

/// Append-only persistence port for the audit trail. There is deliberately
/// no update or delete.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLogRow, AuditError>;

    /// Rows of `query.organization_id` only, newest first.
    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogRow>, AuditError>;

    async fn find(&self, organization_id: Uuid, id: Uuid) -> Result<Option<AuditLogRow>, AuditError>;
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Inserts one audit row on `conn`. Used directly when the audit row has to
/// commit atomically with a business mutation in the same transaction.
pub async fn insert_audit_row(
    conn: &mut PgConnection,
    entry: &NewAuditLog,
) -> Result<AuditLogRow, sqlx::Error> {
    let (before_state, after_state) = match &entry.state {
        Some(state) => {
            let (before, after) = state.columns();
            (Some(before), Some(after))
        }
        None => (None, None),
    };

    sqlx::query_as::<_, AuditLogRow>(
        r#"
        INSERT INTO audit_logs
            (id, organization_id, action, entity_type, entity_id, user_id, user_role,
             details, before_state, after_state, ai_recommended)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.organization_id)
    .bind(&entry.action)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.user_id)
    .bind(entry.user_role.as_str())
    .bind(serde_json::Value::Object(entry.details.clone()))
    .bind(before_state)
    .bind(after_state)
    .bind(entry.ai_recommended)
    .fetch_one(conn)
    .await
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLogRow, AuditError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_audit_row(&mut conn, &entry).await?)
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogRow>, AuditError> {
        let page = query.page.clamped();
        Ok(sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT * FROM audit_logs
            WHERE organization_id = $1
              AND ($2::text IS NULL OR entity_type = $2)
              AND ($3::text IS NULL OR action = $3)
              AND ($4::uuid IS NULL OR user_id = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(query.organization_id)
        .bind(query.entity_type.as_deref())
        .bind(query.action.as_deref())
        .bind(query.user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find(&self, organization_id: Uuid, id: Uuid) -> Result<Option<AuditLogRow>, AuditError> {
        Ok(sqlx::query_as::<_, AuditLogRow>(
            "SELECT * FROM audit_logs WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
