use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{detached, enforce_ai_budget, require_ai_role};
use crate::errors::AppError;
use crate::orchestrator::answered_by;
use crate::services::resume::ResumeService;
use crate::state::AppState;
use crate::tenancy::RequestScope;
use crate::trust::{AiTrustService, TrustedAiResponse, WrapParams};

#[derive(Deserialize)]
pub struct AnonymizeRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct AnonymizeResponse {
    pub anonymized_text: String,
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub resume_id: Option<Uuid>,
    pub resume_text: String,
    pub job_requirements: String,
}

#[derive(Serialize)]
struct AnalyzeDetails {
    resume_id: Option<Uuid>,
    score: f64,
    /// Links this audit row to the governance record of the model call.
    governance_request_id: Option<Uuid>,
}

/// POST /api/v1/resumes/anonymize
pub async fn handle_anonymize(
    State(state): State<AppState>,
    scope: RequestScope,
    Json(req): Json<AnonymizeRequest>,
) -> Result<Json<AnonymizeResponse>, AppError> {
    require_ai_role(&scope)?;
    enforce_ai_budget(&state, &scope)?;
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    let service = ResumeService::new(state.ai.clone(), state.cache.clone(), scope.data_scope());
    let anonymized_text = service.anonymize(&req.text).await;
    Ok(Json(AnonymizeResponse { anonymized_text }))
}

/// POST /api/v1/resumes/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    scope: RequestScope,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<TrustedAiResponse>, AppError> {
    require_ai_role(&scope)?;
    enforce_ai_budget(&state, &scope)?;
    if req.resume_text.trim().is_empty() || req.job_requirements.trim().is_empty() {
        return Err(AppError::Validation(
            "resume_text and job_requirements are required".to_string(),
        ));
    }

    detached(async move {
        let service =
            ResumeService::new(state.ai.clone(), state.cache.clone(), scope.data_scope());
        let analysis = service.analyze(&req.resume_text, &req.job_requirements).await;

        let trust = AiTrustService::new(state.audit.clone(), scope);
        let response = trust
            .wrap_and_log(WrapParams {
                content: analysis.feedback.clone(),
                action_type: "resume.analyze",
                entity_type: "resume",
                entity_id: req.resume_id,
                confidence_score: analysis.confidence_score,
                model_name: answered_by(analysis.provenance.as_ref()),
                sources: Vec::new(),
                reasoning: Some(format!("Scored {:.0}/100 against the job requirements", analysis.score)),
                requires_human_confirmation: true,
                details: &AnalyzeDetails {
                    resume_id: req.resume_id,
                    score: analysis.score,
                    governance_request_id: analysis
                        .provenance
                        .as_ref()
                        .and_then(|p| p.governance_request_id),
                },
                data: &analysis,
            })
            .await?;
        Ok::<_, AppError>(Json(response))
    })
    .await
}
