//! LLM Client: the only module that talks to the model vendor.
//!
//! ARCHITECTURAL RULE: services never call this directly. Every model call
//! goes through `orchestrator::AiOrchestrator`, which owns the kill switch,
//! fallback and governance logging.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Appended to the system prompt when structured output is requested.
const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub json_mode: bool,
}

/// The opaque text-generation capability the orchestrator depends on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    /// First non-blank text block.
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .find(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct VendorError {
    error: VendorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct VendorErrorDetail {
    message: String,
}

/// Anthropic Messages API client. Does not retry; a failed call is reported
/// to the orchestrator, which decides whether to fall back.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<String, LlmError> {
        let system = system_prompt(messages, params.json_mode);
        let request_body = AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            temperature: params.temperature,
            system: Some(system.as_str()).filter(|s| !s.is_empty()),
            messages: messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| AnthropicMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<VendorError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("LLM API returned {status} for model {model}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        debug!(
            "Model {model} answered (tokens in={}, out={})",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );
        parsed.into_text().ok_or(LlmError::EmptyContent)
    }
}

/// Folds system-role messages into the single `system` field the Messages
/// API expects.
fn system_prompt(messages: &[ChatMessage], json_mode: bool) -> String {
    let mut parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if json_mode {
        parts.push(JSON_ONLY_INSTRUCTION);
    }
    parts.join("\n\n")
}

/// Removes a surrounding markdown code fence (with or without a `json`
/// tag) from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
