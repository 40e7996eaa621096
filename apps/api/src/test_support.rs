//! In-memory stand-ins for the database and the model vendor, used by unit
//! tests across the crate. They apply the same tenant filters and ordering
//! as the Postgres queries.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditError, AuditQuery, AuditStore, NewAuditLog};
use crate::governance::{
    GovernanceError, GovernanceQuery, GovernanceStore, NewEthicalAuditLog, NewModelEntry,
    ReviewDecision,
};
use crate::llm_client::{ChatMessage, GenerationParams, LlmError, LlmProvider};
use crate::models::audit::AuditLogRow;
use crate::models::governance::{AiDomain, EthicalAuditLogRow, ModelRegistryRow};
use crate::models::user::UserRole;
use crate::tenancy::RequestScope;

pub fn scope(role: UserRole) -> RequestScope {
    RequestScope {
        organization_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        role,
        request_id: Uuid::new_v4().to_string(),
    }
}

fn db_down() -> sqlx::Error {
    sqlx::Error::PoolClosed
}

// ────────────────────────────────────────────────────────────────────────────
// Audit
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAuditStore {
    rows: Mutex<Vec<AuditLogRow>>,
    fail: bool,
}

impl MemoryAuditStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<AuditLogRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: NewAuditLog) -> Result<AuditLogRow, AuditError> {
        if self.fail {
            return Err(db_down().into());
        }
        let (before_state, after_state) = match &entry.state {
            Some(state) => {
                let (before, after) = state.columns();
                (Some(before), Some(after))
            }
            None => (None, None),
        };
        let row = AuditLogRow {
            id: Uuid::new_v4(),
            organization_id: entry.organization_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            user_id: entry.user_id,
            user_role: entry.user_role.as_str().to_string(),
            details: serde_json::Value::Object(entry.details),
            before_state,
            after_state,
            ai_recommended: entry.ai_recommended,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogRow>, AuditError> {
        if self.fail {
            return Err(db_down().into());
        }
        let page = query.page.clamped();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.organization_id == query.organization_id)
            .filter(|r| query.entity_type.as_ref().map_or(true, |t| &r.entity_type == t))
            .filter(|r| query.action.as_ref().map_or(true, |a| &r.action == a))
            .filter(|r| query.user_id.map_or(true, |u| r.user_id == u))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn find(&self, organization_id: Uuid, id: Uuid) -> Result<Option<AuditLogRow>, AuditError> {
        if self.fail {
            return Err(db_down().into());
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.organization_id == organization_id)
            .cloned())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Governance
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryGovernanceStore {
    registry: Mutex<Vec<ModelRegistryRow>>,
    logs: Mutex<Vec<EthicalAuditLogRow>>,
    fail: bool,
}

impl MemoryGovernanceStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn logs(&self) -> Vec<EthicalAuditLogRow> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl GovernanceStore for MemoryGovernanceStore {
    async fn active_models(&self, domain: AiDomain) -> Result<Vec<ModelRegistryRow>, GovernanceError> {
        if self.fail {
            return Err(db_down().into());
        }
        Ok(self
            .registry
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active && r.domain == domain.as_str())
            .cloned()
            .collect())
    }

    async fn register_model(&self, entry: NewModelEntry) -> Result<ModelRegistryRow, GovernanceError> {
        if self.fail {
            return Err(db_down().into());
        }
        let now = Utc::now();
        let mut registry = self.registry.lock().unwrap();
        for existing in registry
            .iter_mut()
            .filter(|r| r.is_active && r.domain == entry.domain.as_str())
        {
            existing.is_active = false;
            existing.updated_at = now;
        }
        let row = ModelRegistryRow {
            id: Uuid::new_v4(),
            domain: entry.domain.as_str().to_string(),
            version: entry.version,
            model_name: entry.model_name,
            prompt_template: entry.prompt_template,
            parameters: entry.parameters,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        registry.push(row.clone());
        Ok(row)
    }

    async fn insert_log(&self, entry: NewEthicalAuditLog) -> Result<EthicalAuditLogRow, GovernanceError> {
        if self.fail {
            return Err(db_down().into());
        }
        let row = EthicalAuditLogRow {
            id: Uuid::new_v4(),
            organization_id: entry.organization_id,
            domain: entry.domain.as_str().to_string(),
            request_id: entry.request_id,
            model_version_id: entry.model_version_id,
            model_version: entry.model_version,
            model_name: entry.model_name,
            input_summary: entry.input_summary,
            output_data: entry.output_data,
            confidence_score: entry.confidence_score,
            bias_score: entry.bias_score,
            flagged_for_review: entry.flagged_for_review,
            ethical_checks: entry.ethical_checks,
            reviewer_id: None,
            review_status: "pending".to_string(),
            review_notes: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        self.logs.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_logs(&self, query: &GovernanceQuery) -> Result<Vec<EthicalAuditLogRow>, GovernanceError> {
        if self.fail {
            return Err(db_down().into());
        }
        let page = query.page.clamped();
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.organization_id == Some(query.organization_id))
            .filter(|r| query.domain.map_or(true, |d| r.domain == d.as_str()))
            .filter(|r| !query.flagged_only || r.flagged_for_review)
            .filter(|r| query.review_status.map_or(true, |s| r.review_status == s.as_str()))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn review_log(
        &self,
        organization_id: Uuid,
        log_id: Uuid,
        decision: &ReviewDecision,
    ) -> Result<Option<EthicalAuditLogRow>, GovernanceError> {
        if self.fail {
            return Err(db_down().into());
        }
        let mut logs = self.logs.lock().unwrap();
        let Some(row) = logs
            .iter_mut()
            .find(|r| r.id == log_id && r.organization_id == Some(organization_id))
        else {
            return Ok(None);
        };
        row.reviewer_id = Some(decision.reviewer_id);
        row.review_status = decision.status.as_str().to_string();
        row.review_notes = decision.notes.clone();
        row.reviewed_at = Some(Utc::now());
        Ok(Some(row.clone()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LLM
// ────────────────────────────────────────────────────────────────────────────

/// Replies from a queue, then with `fallback_reply` once the queue is empty.
/// Records every model it was asked for.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback_reply: Option<String>,
    calls: Mutex<Vec<(String, f32)>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback_reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), params.temperature));
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback_reply.clone().ok_or(LlmError::EmptyContent)
    }
}
