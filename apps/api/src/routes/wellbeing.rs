use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{detached, enforce_ai_budget, require_ai_role};
use crate::errors::AppError;
use crate::orchestrator::answered_by;
use crate::services::wellbeing::{FrictionLevel, WellbeingService};
use crate::state::AppState;
use crate::tenancy::RequestScope;
use crate::trust::{AiTrustService, TrustedAiResponse, WrapParams};

#[derive(Deserialize)]
pub struct FrictionRequest {
    pub text: String,
}

#[derive(Serialize)]
struct FrictionDetails {
    friction_level: FrictionLevel,
    text_length: usize,
    governance_request_id: Option<Uuid>,
}

/// POST /api/v1/wellbeing/friction
pub async fn handle_check_friction(
    State(state): State<AppState>,
    scope: RequestScope,
    Json(req): Json<FrictionRequest>,
) -> Result<Json<TrustedAiResponse>, AppError> {
    require_ai_role(&scope)?;
    enforce_ai_budget(&state, &scope)?;
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }

    detached(async move {
        let service =
            WellbeingService::new(state.ai.clone(), state.cache.clone(), scope.data_scope());
        let report = service.check_friction(&req.text).await;

        let trust = AiTrustService::new(state.audit.clone(), scope);
        let response = trust
            .wrap_and_log(WrapParams {
                content: report.explanation.clone(),
                action_type: "wellbeing.check_friction",
                entity_type: "text_check",
                entity_id: None,
                confidence_score: report.confidence_score,
                model_name: answered_by(report.provenance.as_ref()),
                sources: Vec::new(),
                reasoning: None,
                requires_human_confirmation: true,
                details: &FrictionDetails {
                    friction_level: report.friction_level,
                    text_length: req.text.chars().count(),
                    governance_request_id: report
                        .provenance
                        .as_ref()
                        .and_then(|p| p.governance_request_id),
                },
                data: &report,
            })
            .await?;
        Ok::<_, AppError>(Json(response))
    })
    .await
}
