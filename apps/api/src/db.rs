use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies pending migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::audit::{insert_audit_row, AuditRecord, NewAuditLog, StateChange};
    use crate::governance::{GovernanceStore, NewEthicalAuditLog, NewModelEntry, PgGovernanceStore};
    use crate::models::governance::AiDomain;
    use crate::models::user::UserRole;
    use crate::test_support::scope;

    const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

    /// Postgres-backed tests run only when `TEST_DATABASE_URL` points at a
    /// disposable database.
    async fn test_pool() -> Option<PgPool> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping Postgres test");
            return None;
        };
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Some(pool)
    }

    #[test]
    fn test_schema_has_no_tenant_foreign_keys() {
        assert!(!SCHEMA.contains("REFERENCES organizations"));
        assert!(SCHEMA.contains("CREATE UNIQUE INDEX IF NOT EXISTS uq_ai_model_registry_domain_active"));
    }

    #[tokio::test]
    async fn test_first_writes_for_a_new_tenant_succeed() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let scope = scope(UserRole::HrAdmin);
        let payload = json!({"score": 70});

        let entry = NewAuditLog::build(
            &scope,
            AuditRecord {
                action: "resume.analyze",
                entity_type: "resume",
                entity_id: None,
                details: &json!({"score": 70}),
                state: Some(StateChange::produced(&payload).unwrap()),
                ai_recommended: true,
            },
        )
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let row = insert_audit_row(&mut conn, &entry).await.unwrap();
        assert_eq!(row.organization_id, scope.organization_id);
        assert_eq!(row.before_state, Some(json!({})));
        assert_eq!(row.after_state, Some(payload));

        let store = PgGovernanceStore::new(pool.clone());
        let log = store
            .insert_log(NewEthicalAuditLog {
                organization_id: Some(scope.organization_id),
                domain: AiDomain::Resume,
                request_id: Uuid::new_v4(),
                model_version_id: None,
                model_version: "unregistered".to_string(),
                model_name: "m".to_string(),
                input_summary: json!({"message_count": 0}),
                output_data: json!({"text": "ok"}),
                confidence_score: None,
                bias_score: 0.0,
                flagged_for_review: false,
                ethical_checks: json!({}),
            })
            .await
            .unwrap();
        assert_eq!(log.organization_id, Some(scope.organization_id));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_leave_one_active_entry() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = Arc::new(PgGovernanceStore::new(pool));
        let register = |version: &str| {
            let store = store.clone();
            let entry = NewModelEntry {
                domain: AiDomain::Interview,
                version: version.to_string(),
                model_name: "m".to_string(),
                prompt_template: None,
                parameters: json!({}),
            };
            async move { store.register_model(entry).await }
        };

        let (a, b) = tokio::join!(register("9.0.0"), register("9.0.1"));
        a.unwrap();
        b.unwrap();

        let active = store.active_models(AiDomain::Interview).await.unwrap();
        assert_eq!(active.len(), 1);
    }
}
