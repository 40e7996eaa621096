use std::sync::Arc;

use sqlx::PgPool;

use crate::audit::AuditService;
use crate::cache::CacheManager;
use crate::config::Config;
use crate::governance::GovernanceRecorder;
use crate::metrics::Metrics;
use crate::orchestrator::AiOrchestrator;
use crate::rate_limit::RateLimits;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub ai: Arc<AiOrchestrator>,
    pub cache: CacheManager,
    pub audit: AuditService,
    pub governance: Arc<GovernanceRecorder>,
    pub metrics: Arc<Metrics>,
    pub limits: Arc<RateLimits>,
}
