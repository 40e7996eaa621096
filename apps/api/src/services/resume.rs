//! Resume processing: anonymization and requirement matching.
//!
//! Both methods are memoized per organization: identical inputs within the
//! cache TTL reuse the first model answer instead of calling the model again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::llm_client::ChatMessage;
use crate::models::governance::AiDomain;
use crate::orchestrator::{AiOrchestrator, ModelReply, Provenance};
use crate::services::prompts::{resume_analysis_prompt, ANONYMIZE_SYSTEM, RESUME_ANALYSIS_SYSTEM};
use crate::services::scrub::scrub_contact_details;
use crate::tenancy::DataScope;

/// Resume text beyond this many characters is not sent to the model.
const MAX_RESUME_CHARS: usize = 4000;
/// Confidence assumed for a non-zero score when the model omits one.
const DEFAULT_SCORED_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub signal: String,
    #[serde(default)]
    pub proof: String,
    #[serde(default)]
    pub assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    /// 0 – 100
    pub score: f64,
    pub feedback: String,
    pub evidence: Vec<Evidence>,
    pub confidence_score: f64,
    /// `None` when the model was unavailable and this is the safe default.
    pub provenance: Option<Provenance>,
}

impl ResumeAnalysis {
    fn fallback() -> Self {
        Self {
            score: 0.0,
            feedback: "Automated analysis is unavailable. Please review this resume manually."
                .to_string(),
            evidence: Vec::new(),
            confidence_score: 0.0,
            provenance: None,
        }
    }

    fn from_model(map: &Map<String, Value>, provenance: Provenance) -> Self {
        let score = map
            .get("score")
            .and_then(number)
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);
        let confidence_score = match map.get("confidence").and_then(number) {
            Some(c) => c.clamp(0.0, 1.0),
            None if score > 0.0 => DEFAULT_SCORED_CONFIDENCE,
            None => 0.0,
        };
        let evidence = map
            .get("evidence")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Self {
            score,
            feedback: map
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or("No feedback.")
                .to_string(),
            evidence,
            confidence_score,
            provenance: Some(provenance),
        }
    }
}

/// Accepts numbers and numeric strings.
fn number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

#[derive(Serialize)]
struct AnalyzeArgs<'a> {
    organization_id: Option<uuid::Uuid>,
    resume_text: &'a str,
    job_requirements: &'a str,
}

#[derive(Serialize)]
struct AnonymizeArgs<'a> {
    organization_id: Option<uuid::Uuid>,
    text: &'a str,
}

pub struct ResumeService {
    ai: Arc<AiOrchestrator>,
    cache: CacheManager,
    scope: DataScope,
}

impl ResumeService {
    pub fn new(ai: Arc<AiOrchestrator>, cache: CacheManager, scope: DataScope) -> Self {
        Self { ai, cache, scope }
    }

    /// Mechanical scrub, then a model pass for names and addresses. Falls
    /// back to the mechanically scrubbed text if the model is unavailable.
    pub async fn anonymize(&self, text: &str) -> String {
        info!("Anonymizing resume text ({} chars)", text.len());
        let scrubbed = scrub_contact_details(text);
        let args = AnonymizeArgs {
            organization_id: self.scope.organization_id(),
            text: &scrubbed,
        };

        let result = self
            .cache
            .memoize(AiDomain::Resume, "anonymize", &args, || async {
                let messages = [
                    ChatMessage::system(ANONYMIZE_SYSTEM),
                    ChatMessage::user(scrubbed.as_str()),
                ];
                self.ai
                    .complete(&messages, Some(0.0), AiDomain::Resume, self.scope)
                    .await
                    .map(|reply| ModelReply {
                        value: reply.value.trim().to_string(),
                        provenance: reply.provenance,
                    })
            })
            .await;

        match result {
            Ok(reply) if !reply.value.is_empty() => reply.value,
            Ok(_) => scrubbed,
            Err(e) => {
                warn!("AI anonymization failed, using mechanical scrub only: {e}");
                scrubbed
            }
        }
    }

    pub async fn analyze(&self, resume_text: &str, job_requirements: &str) -> ResumeAnalysis {
        info!("Analyzing resume against requirements");
        let resume_text = truncate(resume_text, MAX_RESUME_CHARS);
        let args = AnalyzeArgs {
            organization_id: self.scope.organization_id(),
            resume_text,
            job_requirements,
        };

        let result = self
            .cache
            .memoize(AiDomain::Resume, "analyze", &args, || async {
                let prompt = resume_analysis_prompt(job_requirements, resume_text);
                self.ai
                    .analyze_text(
                        RESUME_ANALYSIS_SYSTEM,
                        &prompt,
                        Some(0.3),
                        AiDomain::Resume,
                        self.scope,
                    )
                    .await
            })
            .await;

        match result {
            Ok(reply) => ResumeAnalysis::from_model(&reply.value, reply.provenance),
            Err(e) => {
                warn!("Resume analysis failed, returning default: {e}");
                ResumeAnalysis::fallback()
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
