pub mod admin;
pub mod governance;
pub mod health;
pub mod leave;
pub mod metrics;
pub mod resumes;
pub mod wellbeing;

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use tokio::time::Instant;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::tenancy::{RequestId, RequestScope, REQUEST_ID_HEADER, USER_ID_HEADER};

/// Paths that bypass the global rate limit.
const UNLIMITED_PATHS: &[&str] = &["/health", "/metrics"];

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        // AI-assisted
        .route("/api/v1/resumes/anonymize", post(resumes::handle_anonymize))
        .route("/api/v1/resumes/analyze", post(resumes::handle_analyze))
        .route(
            "/api/v1/wellbeing/friction",
            post(wellbeing::handle_check_friction),
        )
        // Plain mutations
        .route("/api/v1/leave/:id/decision", post(leave::handle_decide))
        // Audit trail
        .route(
            "/api/v1/admin/audit-logs",
            get(admin::handle_list_audit_logs),
        )
        .route(
            "/api/v1/admin/audit-logs/:id",
            get(admin::handle_get_audit_log),
        )
        // Governance
        .route("/api/v1/governance/logs", get(governance::handle_list_logs))
        .route(
            "/api/v1/governance/logs/:id/review",
            patch(governance::handle_review_log),
        )
        .route(
            "/api/v1/governance/models/:domain",
            get(governance::handle_active_model),
        )
        .layer(middleware::from_fn_with_state(state.clone(), global_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Counts every request by method, route template and status, and records
/// its latency.
async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());

    let response = next.run(req).await;

    state.metrics.observe_request(
        &method,
        route.as_deref(),
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Per-caller budget across all endpoints. The caller is the gateway's user
/// id when present, otherwise the peer address.
async fn global_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if UNLIMITED_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }
    let key = caller_key(&req);
    if !state.limits.global.check(&key) {
        warn!("Global rate limit exceeded for {key}");
        state.metrics.record_rate_limited("global");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

fn caller_key(req: &Request) -> String {
    if let Some(user) = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("user:{user}");
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Stricter per-user budget for endpoints that call a model.
fn enforce_ai_budget(state: &AppState, scope: &RequestScope) -> Result<(), AppError> {
    let key = format!("{}:{}", scope.organization_id, scope.user_id);
    if state.limits.ai.check(&key) {
        Ok(())
    } else {
        warn!("AI rate limit exceeded for user {}", scope.user_id);
        state.metrics.record_rate_limited("ai");
        Err(AppError::RateLimited)
    }
}

/// Accepts the caller's `X-Request-ID` or mints one, makes it available to
/// handlers, tags the request span with it and echoes it on the response.
async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn require_ai_role(scope: &RequestScope) -> Result<(), AppError> {
    if scope.role.can_run_ai_analysis() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Runs an AI flow on its own task. A dropped client connection cancels the
/// handler future but not the task, so a model answer that was produced is
/// always audited.
async fn detached<T, F>(flow: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(flow)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}
