//! AI Orchestrator: the single chokepoint for model calls.
//!
//! Order of operations per call:
//! 1. kill switch (fail fast, nothing leaves the process, nothing is logged)
//! 2. primary model, then exactly one retry on the fallback model
//! 3. structured-output parsing (a parse failure counts as a failed attempt)
//! 4. governance record for the finished call, awaited before returning
//!
//! A successful reply carries its [`Provenance`]: the model that answered and
//! the id of the governance record written for it. Failures are counted in
//! `ai_failures_total`.
//!
//! Every error here is caller-recoverable: services substitute a safe default.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AiSettings;
use crate::governance::{CallOutcome, GovernanceEvent, GovernanceRecorder};
use crate::llm_client::{strip_json_fences, ChatMessage, GenerationParams, LlmError, LlmProvider};
use crate::metrics::Metrics;
use crate::models::governance::AiDomain;
use crate::tenancy::DataScope;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI calls are disabled by the kill switch")]
    Disabled,

    #[error("AI models unavailable: {0}")]
    Unavailable(String),

    #[error("AI model returned malformed structured output")]
    MalformedOutput,
}

impl AiError {
    /// Stable code exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AiError::Disabled => "AI_DISABLED",
            AiError::Unavailable(_) => "AI_UNAVAILABLE",
            AiError::MalformedOutput => "AI_MALFORMED_OUTPUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    Structured(Map<String, Value>),
}

/// Where an answer came from. Cached together with the answer, so a cache
/// hit still points at the governance record of the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub model_name: String,
    /// `None` when the governance write failed.
    pub governance_request_id: Option<Uuid>,
}

/// Reported as the model of a result that is a safe default.
pub const NO_MODEL: &str = "none";

/// The model that produced a result, or [`NO_MODEL`] for a safe default.
pub fn answered_by(provenance: Option<&Provenance>) -> &str {
    provenance.map_or(NO_MODEL, |p| p.model_name.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReply<T> {
    pub value: T,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelCall<'a> {
    pub messages: &'a [ChatMessage],
    /// `None` uses the configured default temperature.
    pub temperature: Option<f32>,
    pub domain: AiDomain,
    pub scope: DataScope,
    pub json_output: bool,
}

#[derive(Debug)]
enum AttemptFailure {
    Provider(LlmError),
    Malformed { raw: String },
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Provider(e) => write!(f, "{e}"),
            AttemptFailure::Malformed { .. } => f.write_str("malformed structured output"),
        }
    }
}

impl AttemptFailure {
    fn raw_output(&self) -> &str {
        match self {
            AttemptFailure::Provider(_) => "",
            AttemptFailure::Malformed { raw } => raw,
        }
    }
}

pub struct AiOrchestrator {
    provider: Arc<dyn LlmProvider>,
    governance: Arc<GovernanceRecorder>,
    metrics: Arc<Metrics>,
    settings: AiSettings,
}

impl AiOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        governance: Arc<GovernanceRecorder>,
        metrics: Arc<Metrics>,
        settings: AiSettings,
    ) -> Self {
        Self {
            provider,
            governance,
            metrics,
            settings,
        }
    }

    pub async fn call_model(&self, call: ModelCall<'_>) -> Result<ModelReply<ModelOutput>, AiError> {
        let result = self.run(&call).await;
        if let Err(e) = &result {
            self.metrics
                .record_ai_failure(call.domain, e.code(), call.scope.organization_id());
        }
        result
    }

    async fn run(&self, call: &ModelCall<'_>) -> Result<ModelReply<ModelOutput>, AiError> {
        if self.settings.kill_switch {
            warn!("AI kill switch is on; refusing {} call", call.domain);
            return Err(AiError::Disabled);
        }

        let params = GenerationParams {
            temperature: call.temperature.unwrap_or(self.settings.default_temperature),
            json_mode: call.json_output,
        };

        let primary = self.settings.primary_model.as_str();
        let primary_failure = match self.attempt(primary, call, params).await {
            Ok((raw, output)) => {
                let governance_request_id = self
                    .log_governance(call, &raw, primary, CallOutcome::Primary)
                    .await;
                return Ok(reply(output, primary, governance_request_id));
            }
            Err(failure) => failure,
        };

        let fallback = self.settings.fallback_model.as_str();
        warn!(
            "Primary model {primary} failed for {} ({primary_failure}); falling back to {fallback}",
            call.domain
        );

        match self.attempt(fallback, call, params).await {
            Ok((raw, output)) => {
                let governance_request_id = self
                    .log_governance(call, &raw, fallback, CallOutcome::Fallback)
                    .await;
                Ok(reply(output, fallback, governance_request_id))
            }
            Err(fallback_failure) => {
                self.log_governance(
                    call,
                    fallback_failure.raw_output(),
                    fallback,
                    CallOutcome::Failed,
                )
                .await;
                Err(classify(primary_failure, fallback_failure))
            }
        }
    }

    /// Plain-text completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        domain: AiDomain,
        scope: DataScope,
    ) -> Result<ModelReply<String>, AiError> {
        let reply = self
            .call_model(ModelCall {
                messages,
                temperature,
                domain,
                scope,
                json_output: false,
            })
            .await?;
        let text = match reply.value {
            ModelOutput::Text(text) => text,
            ModelOutput::Structured(map) => Value::Object(map).to_string(),
        };
        Ok(ModelReply {
            value: text,
            provenance: reply.provenance,
        })
    }

    /// System + user prompt in, JSON object out.
    pub async fn analyze_text(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: Option<f32>,
        domain: AiDomain,
        scope: DataScope,
    ) -> Result<ModelReply<Map<String, Value>>, AiError> {
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let reply = self
            .call_model(ModelCall {
                messages: &messages,
                temperature,
                domain,
                scope,
                json_output: true,
            })
            .await?;
        match reply.value {
            ModelOutput::Structured(map) => Ok(ModelReply {
                value: map,
                provenance: reply.provenance,
            }),
            ModelOutput::Text(_) => Err(AiError::MalformedOutput),
        }
    }

    async fn attempt(
        &self,
        model: &str,
        call: &ModelCall<'_>,
        params: GenerationParams,
    ) -> Result<(String, ModelOutput), AttemptFailure> {
        let raw = self
            .provider
            .generate(model, call.messages, params)
            .await
            .map_err(AttemptFailure::Provider)?;

        if !call.json_output {
            return Ok((raw.clone(), ModelOutput::Text(raw)));
        }

        match serde_json::from_str::<Value>(strip_json_fences(&raw)) {
            Ok(Value::Object(map)) => Ok((raw, ModelOutput::Structured(map))),
            _ => Err(AttemptFailure::Malformed { raw }),
        }
    }

    async fn log_governance(
        &self,
        call: &ModelCall<'_>,
        output_text: &str,
        model_name: &str,
        outcome: CallOutcome,
    ) -> Option<Uuid> {
        let request_id = self
            .governance
            .record(GovernanceEvent {
                domain: call.domain,
                organization_id: call.scope.organization_id(),
                messages: call.messages,
                output_text,
                model_name,
                outcome,
            })
            .await;
        if let Some(request_id) = request_id {
            info!(
                "AI call {request_id}: domain={}, model={model_name}, outcome={outcome:?}",
                call.domain
            );
        }
        request_id
    }
}

fn reply(
    output: ModelOutput,
    model_name: &str,
    governance_request_id: Option<Uuid>,
) -> ModelReply<ModelOutput> {
    ModelReply {
        value: output,
        provenance: Provenance {
            model_name: model_name.to_string(),
            governance_request_id,
        },
    }
}

fn classify(primary: AttemptFailure, fallback: AttemptFailure) -> AiError {
    match (primary, fallback) {
        (AttemptFailure::Malformed { .. }, AttemptFailure::Malformed { .. }) => {
            AiError::MalformedOutput
        }
        (_, AttemptFailure::Provider(e)) | (AttemptFailure::Provider(e), _) => {
            AiError::Unavailable(e.to_string())
        }
    }
}
