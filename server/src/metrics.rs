//! # Prometheus Metrics
//!
//! Operational metrics for the custody server, scraped at `/metrics` on
//! the dedicated metrics listener. None of them touch request payloads —
//! a metric that counted per-secret anything would be a side channel.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do
//! not collide with any default global registry consumers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the custody server.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers and background tasks.
#[derive(Clone)]
pub struct ServerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total HTTP requests dispatched to a share endpoint.
    pub requests_total: IntCounter,
    /// Total tokens minted across all three token endpoints.
    pub tokens_minted_total: IntCounter,
    /// Total execute requests refused for an invalid token.
    pub token_rejections_total: IntCounter,
    /// Total shares stored.
    pub shares_stored_total: IntCounter,
    /// Total shares retrieved.
    pub shares_retrieved_total: IntCounter,
    /// Total shares deleted.
    pub shares_deleted_total: IntCounter,
}

impl ServerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("svalbard".into()), None)
            .expect("failed to create prometheus registry");

        let requests_total = IntCounter::new(
            "requests_total",
            "Total HTTP requests dispatched to share endpoints",
        )
        .expect("metric creation");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("metric registration");

        let tokens_minted_total = IntCounter::new(
            "tokens_minted_total",
            "Total tokens minted across the token endpoints",
        )
        .expect("metric creation");
        registry
            .register(Box::new(tokens_minted_total.clone()))
            .expect("metric registration");

        let token_rejections_total = IntCounter::new(
            "token_rejections_total",
            "Total execute requests refused for an invalid token",
        )
        .expect("metric creation");
        registry
            .register(Box::new(token_rejections_total.clone()))
            .expect("metric registration");

        let shares_stored_total =
            IntCounter::new("shares_stored_total", "Total shares stored").expect("metric creation");
        registry
            .register(Box::new(shares_stored_total.clone()))
            .expect("metric registration");

        let shares_retrieved_total =
            IntCounter::new("shares_retrieved_total", "Total shares retrieved")
                .expect("metric creation");
        registry
            .register(Box::new(shares_retrieved_total.clone()))
            .expect("metric registration");

        let shares_deleted_total =
            IntCounter::new("shares_deleted_total", "Total shares deleted")
                .expect("metric creation");
        registry
            .register(Box::new(shares_deleted_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            requests_total,
            tokens_minted_total,
            token_rejections_total,
            shares_stored_total,
            shares_retrieved_total,
            shares_deleted_total,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics_handler(State(metrics): State<Arc<ServerMetrics>>) -> impl IntoResponse {
    (StatusCode::OK, metrics.encode())
}

/// `GET /health` — liveness probe for orchestrators. Intentionally does
/// not check the share store; a wedged disk shows up in `/metrics` and in
/// the request logs, not here.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok\n")
}
