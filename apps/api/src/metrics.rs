//! Prometheus metrics, scraped from `GET /metrics`.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use uuid::Uuid;

use crate::models::governance::AiDomain;

/// Label value for AI calls made outside any tenant.
const GLOBAL_ORGANIZATION: &str = "global";
/// Label value for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

pub struct Metrics {
    registry: Registry,
    /// Failed orchestrator calls, kill-switch refusals included.
    ai_failures_total: IntCounterVec,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    rate_limited_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let ai_failures_total = IntCounterVec::new(
            Opts::new("ai_failures_total", "AI calls that ended in an error"),
            &["domain", "error_code", "organization_id"],
        )?;
        registry.register(Box::new(ai_failures_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests handled"),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["method", "route"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests refused by a rate limiter"),
            &["limiter"],
        )?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        Ok(Self {
            registry,
            ai_failures_total,
            http_requests_total,
            http_request_duration_seconds,
            rate_limited_total,
        })
    }

    pub fn record_ai_failure(
        &self,
        domain: AiDomain,
        error_code: &str,
        organization_id: Option<Uuid>,
    ) {
        let organization = organization_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| GLOBAL_ORGANIZATION.to_string());
        self.ai_failures_total
            .with_label_values(&[domain.as_str(), error_code, &organization])
            .inc();
    }

    /// `route` is the matched route template, never the raw path, so ids in
    /// URLs do not become label values.
    pub fn observe_request(&self, method: &str, route: Option<&str>, status: u16, elapsed: Duration) {
        let route = route.unwrap_or(UNMATCHED_ROUTE);
        self.http_requests_total
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_rate_limited(&self, limiter: &str) {
        self.rate_limited_total.with_label_values(&[limiter]).inc();
    }

    /// Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
