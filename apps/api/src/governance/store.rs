use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{GovernanceError, GovernanceQuery, ReviewDecision};
use crate::models::governance::{AiDomain, EthicalAuditLogRow, ModelRegistryRow};

/// Fields of a new registry entry. Registering activates it and retires any
/// other active entry for the same domain.
#[derive(Debug, Clone)]
pub struct NewModelEntry {
    pub domain: AiDomain,
    pub version: String,
    pub model_name: String,
    pub prompt_template: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct NewEthicalAuditLog {
    pub organization_id: Option<Uuid>,
    pub domain: AiDomain,
    pub request_id: Uuid,
    pub model_version_id: Option<Uuid>,
    pub model_version: String,
    pub model_name: String,
    pub input_summary: Value,
    pub output_data: Value,
    pub confidence_score: Option<f64>,
    pub bias_score: f64,
    pub flagged_for_review: bool,
    pub ethical_checks: Value,
}

/// Persistence port for the model registry and governance records.
#[async_trait]
pub trait GovernanceStore: Send + Sync {
    /// Every entry currently marked active for `domain`.
    async fn active_models(&self, domain: AiDomain) -> Result<Vec<ModelRegistryRow>, GovernanceError>;

    async fn register_model(&self, entry: NewModelEntry) -> Result<ModelRegistryRow, GovernanceError>;

    async fn insert_log(&self, entry: NewEthicalAuditLog) -> Result<EthicalAuditLogRow, GovernanceError>;

    async fn list_logs(&self, query: &GovernanceQuery) -> Result<Vec<EthicalAuditLogRow>, GovernanceError>;

    /// Writes reviewer fields only. `None` when the log does not exist in
    /// `organization_id`.
    async fn review_log(
        &self,
        organization_id: Uuid,
        log_id: Uuid,
        decision: &ReviewDecision,
    ) -> Result<Option<EthicalAuditLogRow>, GovernanceError>;
}

pub struct PgGovernanceStore {
    pool: PgPool,
}

impl PgGovernanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GovernanceStore for PgGovernanceStore {
    async fn active_models(&self, domain: AiDomain) -> Result<Vec<ModelRegistryRow>, GovernanceError> {
        Ok(sqlx::query_as::<_, ModelRegistryRow>(
            "SELECT * FROM ai_model_registry WHERE domain = $1 AND is_active ORDER BY updated_at DESC",
        )
        .bind(domain.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn register_model(&self, entry: NewModelEntry) -> Result<ModelRegistryRow, GovernanceError> {
        let mut tx = self.pool.begin().await?;

        // Serializes registrations per domain until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(entry.domain.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE ai_model_registry SET is_active = FALSE, updated_at = now() \
             WHERE domain = $1 AND is_active",
        )
        .bind(entry.domain.as_str())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ModelRegistryRow>(
            r#"
            INSERT INTO ai_model_registry
                (id, domain, version, model_name, prompt_template, parameters, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.domain.as_str())
        .bind(&entry.version)
        .bind(&entry.model_name)
        .bind(&entry.prompt_template)
        .bind(&entry.parameters)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn insert_log(&self, entry: NewEthicalAuditLog) -> Result<EthicalAuditLogRow, GovernanceError> {
        Ok(sqlx::query_as::<_, EthicalAuditLogRow>(
            r#"
            INSERT INTO ethical_audit_logs
                (id, organization_id, domain, request_id, model_version_id, model_version,
                 model_name, input_summary, output_data, confidence_score, bias_score,
                 flagged_for_review, ethical_checks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.organization_id)
        .bind(entry.domain.as_str())
        .bind(entry.request_id)
        .bind(entry.model_version_id)
        .bind(&entry.model_version)
        .bind(&entry.model_name)
        .bind(&entry.input_summary)
        .bind(&entry.output_data)
        .bind(entry.confidence_score)
        .bind(entry.bias_score)
        .bind(entry.flagged_for_review)
        .bind(&entry.ethical_checks)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_logs(&self, query: &GovernanceQuery) -> Result<Vec<EthicalAuditLogRow>, GovernanceError> {
        let page = query.page.clamped();
        Ok(sqlx::query_as::<_, EthicalAuditLogRow>(
            r#"
            SELECT * FROM ethical_audit_logs
            WHERE organization_id = $1
              AND ($2::text IS NULL OR domain = $2)
              AND (NOT $3 OR flagged_for_review)
              AND ($4::text IS NULL OR review_status = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(query.organization_id)
        .bind(query.domain.map(|d| d.as_str()))
        .bind(query.flagged_only)
        .bind(query.review_status.map(|s| s.as_str()))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn review_log(
        &self,
        organization_id: Uuid,
        log_id: Uuid,
        decision: &ReviewDecision,
    ) -> Result<Option<EthicalAuditLogRow>, GovernanceError> {
        Ok(sqlx::query_as::<_, EthicalAuditLogRow>(
            r#"
            UPDATE ethical_audit_logs
            SET reviewer_id = $3, review_status = $4, review_notes = $5, reviewed_at = now()
            WHERE id = $1 AND organization_id = $2
            RETURNING *
            "#,
        )
        .bind(log_id)
        .bind(organization_id)
        .bind(decision.reviewer_id)
        .bind(decision.status.as_str())
        .bind(&decision.notes)
        .fetch_optional(&self.pool)
        .await?)
    }
}
