use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One append-only audit trail row. Written for any significant mutation,
/// AI-assisted or not.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub user_id: Uuid,
    pub user_role: String,
    pub details: Value,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub ai_recommended: bool,
    pub created_at: DateTime<Utc>,
}
