//! Governance Recorder: one immutable `EthicalAuditLog` per AI call.
//!
//! Stamps provenance (active registry entry, model actually used, request
//! id), a summarized input, and a bias signal. Recording is best-effort:
//! `record` never returns an error and never blocks the AI response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GovernanceSettings;
use crate::llm_client::{ChatMessage, Role};
use crate::models::governance::{AiDomain, EthicalAuditLogRow, ModelRegistryRow, ReviewStatus};
use crate::models::Page;

pub mod bias;
pub mod store;

pub use bias::BiasScanner;
pub use store::{GovernanceStore, NewEthicalAuditLog, NewModelEntry, PgGovernanceStore};

/// Marker stamped on records when no registry entry is active for the domain.
pub const UNREGISTERED_MODEL_VERSION: &str = "unregistered";

/// Per-message excerpt length kept in the input summary.
const EXCERPT_CHARS: usize = 280;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("A review must approve or reject")]
    InvalidReview,
}

/// How the orchestrator's call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Primary,
    Fallback,
    Failed,
}

/// Everything the orchestrator knows about one finished call.
#[derive(Debug, Clone, Copy)]
pub struct GovernanceEvent<'a> {
    pub domain: AiDomain,
    pub organization_id: Option<Uuid>,
    pub messages: &'a [ChatMessage],
    pub output_text: &'a str,
    pub model_name: &'a str,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExcerpt {
    pub role: Role,
    pub excerpt: String,
    pub chars: usize,
}

/// Redacted, truncated view of the prompt. Raw prompts are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    pub message_count: usize,
    pub total_chars: usize,
    pub messages: Vec<MessageExcerpt>,
}

impl InputSummary {
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let excerpts: Vec<MessageExcerpt> = messages
            .iter()
            .map(|m| MessageExcerpt {
                role: m.role,
                excerpt: truncate_chars(&redact(&m.content), EXCERPT_CHARS),
                chars: m.content.chars().count(),
            })
            .collect();
        Self {
            message_count: messages.len(),
            total_chars: excerpts.iter().map(|e| e.chars).sum(),
            messages: excerpts,
        }
    }
}

/// Structured signals stored in `ethical_checks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicalChecks {
    pub outcome: CallOutcome,
    pub fallback_used: bool,
    pub bias_threshold: f64,
    pub decision_terms: Vec<String>,
    pub protected_terms_nearby: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub reviewer_id: Uuid,
    pub status: ReviewStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GovernanceQuery {
    pub organization_id: Uuid,
    pub domain: Option<AiDomain>,
    pub flagged_only: bool,
    pub review_status: Option<ReviewStatus>,
    pub page: Page,
}

impl GovernanceQuery {
    pub fn for_org(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            domain: None,
            flagged_only: false,
            review_status: None,
            page: Page::default(),
        }
    }
}

pub struct GovernanceRecorder {
    store: Arc<dyn GovernanceStore>,
    scanner: BiasScanner,
    settings: GovernanceSettings,
}

impl GovernanceRecorder {
    pub fn new(store: Arc<dyn GovernanceStore>, settings: GovernanceSettings) -> Self {
        Self {
            store,
            scanner: BiasScanner::from_settings(&settings),
            settings,
        }
    }

    /// Persists one governance record for a finished AI call and returns its
    /// request id. Any internal failure is logged and swallowed.
    pub async fn record(&self, event: GovernanceEvent<'_>) -> Option<Uuid> {
        match self.try_record(event).await {
            Ok(row) => Some(row.request_id),
            Err(e) => {
                warn!(
                    "Governance logging failed for domain {}: {e}",
                    event.domain
                );
                None
            }
        }
    }

    async fn try_record(&self, event: GovernanceEvent<'_>) -> Result<EthicalAuditLogRow, GovernanceError> {
        let registry = match self.active_model(event.domain).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Model registry lookup failed for {}: {e}", event.domain);
                None
            }
        };

        let assessment = self.scanner.assess(event.output_text);
        let flagged_for_review = assessment.score > self.settings.bias_threshold;
        let checks = EthicalChecks {
            outcome: event.outcome,
            fallback_used: event.outcome == CallOutcome::Fallback,
            bias_threshold: self.settings.bias_threshold,
            decision_terms: assessment.decision_terms,
            protected_terms_nearby: assessment.protected_terms_nearby,
        };

        let request_id = Uuid::new_v4();
        let row = self
            .store
            .insert_log(NewEthicalAuditLog {
                organization_id: event.organization_id,
                domain: event.domain,
                request_id,
                model_version_id: registry.as_ref().map(|r| r.id),
                model_version: registry
                    .as_ref()
                    .map(|r| r.version.clone())
                    .unwrap_or_else(|| UNREGISTERED_MODEL_VERSION.to_string()),
                model_name: event.model_name.to_string(),
                input_summary: serde_json::to_value(InputSummary::from_messages(event.messages))?,
                output_data: json!({ "text": event.output_text }),
                confidence_score: None,
                bias_score: assessment.score,
                flagged_for_review,
                ethical_checks: serde_json::to_value(&checks)?,
            })
            .await?;

        if flagged_for_review {
            info!(
                "Governance record {request_id} flagged for review (domain={}, bias_score={:.2})",
                event.domain, assessment.score
            );
        }
        Ok(row)
    }

    /// The authoritative active registry entry for `domain`.
    ///
    /// More than one active entry is a data-integrity fault; the most recently
    /// updated entry wins, then the highest version string.
    pub async fn active_model(&self, domain: AiDomain) -> Result<Option<ModelRegistryRow>, GovernanceError> {
        let active = self.store.active_models(domain).await?;
        if active.len() > 1 {
            warn!(
                "{} active registry entries for domain {domain}; using the most recently updated",
                active.len()
            );
        }
        Ok(pick_authoritative(active))
    }

    pub async fn register_model(&self, entry: NewModelEntry) -> Result<ModelRegistryRow, GovernanceError> {
        let row = self.store.register_model(entry).await?;
        info!(
            "Registered model {} v{} for domain {}",
            row.model_name, row.version, row.domain
        );
        Ok(row)
    }

    /// Ensures every seeded domain has an active registry entry. Returns the
    /// number of entries created.
    pub async fn seed_defaults(&self, model_name: &str) -> Result<usize, GovernanceError> {
        let mut created = 0;
        for domain in AiDomain::SEEDED {
            if !self.store.active_models(domain).await?.is_empty() {
                continue;
            }
            self.register_model(NewModelEntry {
                domain,
                version: "1.0.0".to_string(),
                model_name: model_name.to_string(),
                prompt_template: Some(format!("Default enterprise prompt for {domain}")),
                parameters: json!({ "temperature": 0.7 }),
            })
            .await?;
            created += 1;
        }
        Ok(created)
    }

    pub async fn list_logs(&self, query: &GovernanceQuery) -> Result<Vec<EthicalAuditLogRow>, GovernanceError> {
        self.store.list_logs(query).await
    }

    /// Records a human review. Only the reviewer fields change.
    pub async fn review(
        &self,
        organization_id: Uuid,
        log_id: Uuid,
        decision: &ReviewDecision,
    ) -> Result<Option<EthicalAuditLogRow>, GovernanceError> {
        if decision.status == ReviewStatus::Pending {
            return Err(GovernanceError::InvalidReview);
        }
        self.store.review_log(organization_id, log_id, decision).await
    }
}

fn pick_authoritative(entries: Vec<ModelRegistryRow>) -> Option<ModelRegistryRow> {
    entries
        .into_iter()
        .max_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.version.cmp(&b.version))
        })
}

/// Replaces e-mail-like and long digit-run tokens.
fn redact(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let digits = word.chars().filter(|c| c.is_ascii_digit()).count();
            if word.contains('@') && word.contains('.') {
                "[EMAIL]"
            } else if digits >= 7 {
                "[NUMBER]"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support::MemoryGovernanceStore;

    fn recorder(store: Arc<MemoryGovernanceStore>) -> GovernanceRecorder {
        GovernanceRecorder::new(store, GovernanceSettings::default())
    }

    fn event<'a>(messages: &'a [ChatMessage], output: &'a str, org: Option<Uuid>) -> GovernanceEvent<'a> {
        GovernanceEvent {
            domain: AiDomain::Resume,
            organization_id: org,
            messages,
            output_text: output,
            model_name: "primary-model",
            outcome: CallOutcome::Primary,
        }
    }

    #[tokio::test]
    async fn test_rejection_phrase_is_flagged() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let messages = [ChatMessage::user("Evaluate this candidate")];

        rec.record(event(&messages, "I reject and deny this application.", None))
            .await
            .expect("record should succeed");

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].bias_score > 0.0);
        assert!(logs[0].flagged_for_review);
    }

    #[tokio::test]
    async fn test_configured_protected_terms_drive_flagging() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let settings = GovernanceSettings {
            bias_threshold: 0.5,
            protected_terms: Some(vec!["caste".to_string()]),
            ..GovernanceSettings::default()
        };
        let rec = GovernanceRecorder::new(store.clone(), settings);
        let messages = [ChatMessage::user("Evaluate this candidate")];

        rec.record(event(&messages, "Reject because of caste.", None))
            .await
            .unwrap();
        rec.record(event(&messages, "Reject because of age.", None))
            .await
            .unwrap();

        let logs = store.logs();
        let caste = logs
            .iter()
            .find(|l| l.output_data["text"] == "Reject because of caste.")
            .unwrap();
        let age = logs
            .iter()
            .find(|l| l.output_data["text"] == "Reject because of age.")
            .unwrap();
        assert!(caste.flagged_for_review);
        assert_eq!(caste.ethical_checks["protected_terms_nearby"], json!(["caste"]));
        assert!(!age.flagged_for_review);
    }

    #[tokio::test]
    async fn test_neutral_text_is_not_flagged() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let messages = [ChatMessage::user("Summarize")];

        rec.record(event(&messages, "Strong communicator with solid SQL skills.", None))
            .await
            .unwrap();

        let logs = store.logs();
        assert_eq!(logs[0].bias_score, 0.0);
        assert!(!logs[0].flagged_for_review);
        assert_eq!(logs[0].review_status, "pending");
    }

    #[tokio::test]
    async fn test_missing_registry_uses_unregistered_marker() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let messages = [ChatMessage::user("hi")];

        rec.record(event(&messages, "ok", None)).await.unwrap();

        let log = &store.logs()[0];
        assert_eq!(log.model_version, UNREGISTERED_MODEL_VERSION);
        assert!(log.model_version_id.is_none());
        assert_eq!(log.model_name, "primary-model");
    }

    #[tokio::test]
    async fn test_record_stamps_active_registry_entry() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        rec.seed_defaults("gpt-4").await.unwrap();
        let active = rec.active_model(AiDomain::Resume).await.unwrap().unwrap();
        let org = Uuid::new_v4();
        let messages = [ChatMessage::user("hi")];

        let request_id = rec.record(event(&messages, "ok", Some(org))).await.unwrap();

        let log = &store.logs()[0];
        assert_eq!(log.request_id, request_id);
        assert_eq!(log.model_version_id, Some(active.id));
        assert_eq!(log.model_version, "1.0.0");
        assert_eq!(log.organization_id, Some(org));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = Arc::new(MemoryGovernanceStore::failing());
        let rec = recorder(store.clone());
        let messages = [ChatMessage::user("hi")];

        assert!(rec.record(event(&messages, "ok", None)).await.is_none());
    }

    #[tokio::test]
    async fn test_each_record_gets_a_fresh_request_id() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let messages = [ChatMessage::user("hi")];

        let a = rec.record(event(&messages, "ok", None)).await.unwrap();
        let b = rec.record(event(&messages, "ok", None)).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_register_model_keeps_one_active_per_domain() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        assert_eq!(rec.seed_defaults("gpt-4").await.unwrap(), AiDomain::SEEDED.len());
        assert_eq!(rec.seed_defaults("gpt-4").await.unwrap(), 0);

        rec.register_model(NewModelEntry {
            domain: AiDomain::Resume,
            version: "2.0.0".to_string(),
            model_name: "claude".to_string(),
            prompt_template: None,
            parameters: json!({}),
        })
        .await
        .unwrap();

        let active = store.active_models(AiDomain::Resume).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, "2.0.0");
    }

    #[test]
    fn test_tie_break_prefers_most_recently_updated() {
        let now = Utc::now();
        let make = |version: &str, updated_at| ModelRegistryRow {
            id: Uuid::new_v4(),
            domain: "resume".to_string(),
            version: version.to_string(),
            model_name: "m".to_string(),
            prompt_template: None,
            parameters: json!({}),
            is_active: true,
            created_at: now,
            updated_at,
        };
        let older = make("9.0.0", now - Duration::days(1));
        let newer = make("1.0.0", now);
        let picked = pick_authoritative(vec![older, newer.clone()]).unwrap();
        assert_eq!(picked.id, newer.id);

        let same_a = make("1.0.0", now);
        let same_b = make("1.1.0", now);
        let picked = pick_authoritative(vec![same_b.clone(), same_a]).unwrap();
        assert_eq!(picked.id, same_b.id);
    }

    #[tokio::test]
    async fn test_review_updates_only_reviewer_fields() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let org = Uuid::new_v4();
        let messages = [ChatMessage::user("hi")];
        rec.record(event(&messages, "Reject.", Some(org))).await.unwrap();
        let before = store.logs()[0].clone();
        let reviewer = Uuid::new_v4();

        let after = rec
            .review(
                org,
                before.id,
                &ReviewDecision {
                    reviewer_id: reviewer,
                    status: ReviewStatus::Approved,
                    notes: Some("false positive".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(after.reviewer_id, Some(reviewer));
        assert_eq!(after.review_status, "approved");
        assert!(after.reviewed_at.is_some());
        assert_eq!(after.bias_score, before.bias_score);
        assert_eq!(after.output_data, before.output_data);
        assert_eq!(after.request_id, before.request_id);
    }

    #[tokio::test]
    async fn test_review_is_tenant_scoped_and_rejects_pending() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let org = Uuid::new_v4();
        let messages = [ChatMessage::user("hi")];
        rec.record(event(&messages, "ok", Some(org))).await.unwrap();
        let id = store.logs()[0].id;
        let decision = |status| ReviewDecision {
            reviewer_id: Uuid::new_v4(),
            status,
            notes: None,
        };

        let other_org = rec
            .review(Uuid::new_v4(), id, &decision(ReviewStatus::Rejected))
            .await
            .unwrap();
        assert!(other_org.is_none());

        assert!(matches!(
            rec.review(org, id, &decision(ReviewStatus::Pending)).await,
            Err(GovernanceError::InvalidReview)
        ));
    }

    #[tokio::test]
    async fn test_list_logs_never_crosses_tenants() {
        let store = Arc::new(MemoryGovernanceStore::default());
        let rec = recorder(store.clone());
        let (org_a, org_b) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = [ChatMessage::user("hi")];
        for org in [Some(org_a), Some(org_b), Some(org_b), None] {
            rec.record(event(&messages, "ok", org)).await.unwrap();
        }

        let rows = rec.list_logs(&GovernanceQuery::for_org(org_a)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.organization_id == Some(org_a)));
    }

    #[test]
    fn test_input_summary_redacts_and_truncates() {
        let long = "x".repeat(EXCERPT_CHARS + 50);
        let messages = [
            ChatMessage::system("Scrub PII"),
            ChatMessage::user(format!("Contact jane.doe@example.com or 555123456789 {long}")),
        ];
        let summary = InputSummary::from_messages(&messages);
        assert_eq!(summary.message_count, 2);
        let excerpt = &summary.messages[1].excerpt;
        assert!(excerpt.contains("[EMAIL]"));
        assert!(excerpt.contains("[NUMBER]"));
        assert!(!excerpt.contains("jane.doe"));
        assert!(excerpt.ends_with('…'));
        assert_eq!(excerpt.chars().count(), EXCERPT_CHARS + 1);
    }
}
