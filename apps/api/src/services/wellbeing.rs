//! Wellbeing: friction detection on workplace messages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::cache::CacheManager;
use crate::models::governance::AiDomain;
use crate::orchestrator::{AiOrchestrator, Provenance};
use crate::services::prompts::FRICTION_SYSTEM;
use crate::tenancy::DataScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrictionLevel {
    Low,
    Medium,
    High,
    /// No assessment could be made.
    Unknown,
}

impl FrictionLevel {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "none" => FrictionLevel::Low,
            "medium" | "moderate" => FrictionLevel::Medium,
            "high" | "severe" => FrictionLevel::High,
            _ => FrictionLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrictionReport {
    pub friction_level: FrictionLevel,
    pub indicators: Vec<String>,
    pub explanation: String,
    pub confidence_score: f64,
    /// `None` when no model answered and this is the safe default.
    pub provenance: Option<Provenance>,
}

impl FrictionReport {
    fn unavailable() -> Self {
        Self {
            friction_level: FrictionLevel::Unknown,
            indicators: Vec::new(),
            explanation: "Friction analysis is unavailable.".to_string(),
            confidence_score: 0.0,
            provenance: None,
        }
    }

    fn from_model(map: &Map<String, Value>, provenance: Provenance) -> Self {
        let indicators = match map.get("indicators") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            friction_level: map
                .get("friction_level")
                .and_then(Value::as_str)
                .map(FrictionLevel::parse)
                .unwrap_or(FrictionLevel::Unknown),
            indicators,
            explanation: map
                .get("explanation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            confidence_score: map
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            provenance: Some(provenance),
        }
    }
}

#[derive(Serialize)]
struct FrictionArgs<'a> {
    organization_id: Option<uuid::Uuid>,
    text: &'a str,
}

pub struct WellbeingService {
    ai: Arc<AiOrchestrator>,
    cache: CacheManager,
    scope: DataScope,
}

impl WellbeingService {
    pub fn new(ai: Arc<AiOrchestrator>, cache: CacheManager, scope: DataScope) -> Self {
        Self { ai, cache, scope }
    }

    pub async fn check_friction(&self, text: &str) -> FrictionReport {
        let args = FrictionArgs {
            organization_id: self.scope.organization_id(),
            text,
        };
        let result = self
            .cache
            .memoize(AiDomain::Wellbeing, "check_friction", &args, || async {
                self.ai
                    .analyze_text(
                        FRICTION_SYSTEM,
                        text,
                        Some(0.2),
                        AiDomain::Wellbeing,
                        self.scope,
                    )
                    .await
            })
            .await;

        match result {
            Ok(reply) => FrictionReport::from_model(&reply.value, reply.provenance),
            Err(e) => {
                warn!("Friction check failed: {e}");
                FrictionReport::unavailable()
            }
        }
    }
}
