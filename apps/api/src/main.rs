mod audit;
mod cache;
mod config;
mod db;
mod errors;
mod governance;
mod llm_client;
mod metrics;
mod models;
mod orchestrator;
mod rate_limit;
mod routes;
mod services;
mod state;
mod tenancy;
mod trust;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audit::{AuditService, PgAuditStore};
use crate::cache::{CacheManager, CacheStore, MemoryCacheStore, RedisCacheStore};
use crate::config::{CacheBackend, CacheSettings, Config};
use crate::db::{create_pool, run_migrations};
use crate::governance::{GovernanceRecorder, PgGovernanceStore};
use crate::llm_client::LlmClient;
use crate::metrics::Metrics;
use crate::orchestrator::AiOrchestrator;
use crate::rate_limit::RateLimits;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Trust API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Initialize cache
    let cache = CacheManager::new(build_cache_store(&config.cache)?, config.cache.clone());
    info!(
        "Cache initialized (backend: {:?}, enabled: {})",
        config.cache.backend,
        cache.is_enabled()
    );

    // Initialize governance and seed the model registry
    let governance = Arc::new(GovernanceRecorder::new(
        Arc::new(PgGovernanceStore::new(db.clone())),
        config.governance.clone(),
    ));
    match governance.seed_defaults(&config.ai.primary_model).await {
        Ok(0) => {}
        Ok(n) => info!("Seeded {n} model registry entries"),
        Err(e) => warn!("Model registry seeding failed: {e}"),
    }

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    // Initialize LLM client and orchestrator
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        Duration::from_secs(config.ai.timeout_secs),
    )
    .context("Failed to build LLM client")?;
    let ai = Arc::new(AiOrchestrator::new(
        Arc::new(llm),
        governance.clone(),
        metrics.clone(),
        config.ai.clone(),
    ));
    info!(
        "AI orchestrator initialized (primary: {}, fallback: {}, kill switch: {})",
        config.ai.primary_model, config.ai.fallback_model, config.ai.kill_switch
    );

    let state = AppState {
        audit: AuditService::new(Arc::new(PgAuditStore::new(db.clone()))),
        db,
        config: config.clone(),
        ai,
        cache,
        governance,
        metrics,
        limits: Arc::new(RateLimits::new(config.rate_limit)),
    };
    info!(
        "Rate limits: {}/min per caller, {}/min for AI endpoints",
        config.rate_limit.requests_per_minute, config.rate_limit.ai_requests_per_minute
    );

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_cache_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>> {
    match (settings.backend, settings.redis_url.as_deref()) {
        (CacheBackend::Redis, Some(url)) => {
            let client = redis::Client::open(url).context("Invalid REDIS_URL")?;
            Ok(Arc::new(RedisCacheStore::new(client)))
        }
        _ => Ok(Arc::new(MemoryCacheStore::new())),
    }
}
