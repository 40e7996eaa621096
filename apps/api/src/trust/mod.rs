//! Trust Wrapper. Every AI-derived result shown to a person goes through
//! `AiTrustService::wrap_and_log`.
//!
//! The wrapper attaches the trust envelope (confidence, sources, reasoning,
//! human-confirmation flag) and writes the correlated audit row. If the audit
//! row cannot be written the result is not returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::audit::{AuditError, AuditRecord, AuditService, StateChange};
use crate::tenancy::RequestScope;

pub const HIGH_CONFIDENCE: f64 = 0.85;
pub const MEDIUM_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Total over all inputs: non-finite scores count as 0, out-of-range
    /// scores are clamped to [0, 1].
    pub fn from_score(score: f64) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if score >= HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if score >= MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A retrieved document chunk the AI output relied on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_index: u32,
    pub snippet: String,
    pub similarity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustMetadata {
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub ai_model: String,
    pub sources: Vec<SourceCitation>,
    pub reasoning: Option<String>,
    pub requires_human_confirmation: bool,
    pub timestamp: DateTime<Utc>,
}

/// Client-facing envelope. The JSON shape is a stable API contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedAiResponse {
    pub content: String,
    pub trust: TrustMetadata,
}

/// Parameters for one trust-wrapped action.
///
/// `details` must serialize to a JSON object (or `()` for none); `data` is
/// the full structured payload shown to the user and becomes the audit row's
/// after-state.
pub struct WrapParams<'a, D: Serialize + ?Sized, P: Serialize + ?Sized> {
    pub content: String,
    pub action_type: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<Uuid>,
    pub confidence_score: f64,
    pub model_name: &'a str,
    pub sources: Vec<SourceCitation>,
    pub reasoning: Option<String>,
    pub requires_human_confirmation: bool,
    pub details: &'a D,
    pub data: &'a P,
}

/// Built per request from the request's scope.
pub struct AiTrustService {
    audit: AuditService,
    scope: RequestScope,
}

impl AiTrustService {
    pub fn new(audit: AuditService, scope: RequestScope) -> Self {
        Self { audit, scope }
    }

    pub async fn wrap_and_log<D, P>(&self, params: WrapParams<'_, D, P>) -> Result<TrustedAiResponse, AuditError>
    where
        D: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        let trust = TrustMetadata {
            confidence_score: params.confidence_score,
            confidence_level: ConfidenceLevel::from_score(params.confidence_score),
            ai_model: params.model_name.to_string(),
            sources: params.sources,
            reasoning: params.reasoning,
            requires_human_confirmation: params.requires_human_confirmation,
            timestamp: Utc::now(),
        };

        let mut details = match serde_json::to_value(params.details)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(AuditError::InvalidDetails),
        };
        details.insert("trust_metadata".to_string(), serde_json::to_value(&trust)?);

        self.audit
            .log(
                &self.scope,
                AuditRecord {
                    action: params.action_type,
                    entity_type: params.entity_type,
                    entity_id: params.entity_id,
                    details: &details,
                    state: Some(StateChange::produced(params.data)?),
                    ai_recommended: true,
                },
            )
            .await?;

        Ok(TrustedAiResponse {
            content: params.content,
            trust,
        })
    }
}
