//! API Router configuration

use super::calls_handler::{call_status, hangup_call, health_check, negotiate_call};
use super::metrics_handler::metrics_handler;
use crate::application::CallService;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub calls: Arc<CallService>,
}

impl AppState {
    pub fn new(calls: Arc<CallService>) -> Self {
        Self { calls }
    }
}

/// Build the API router. `/metrics` is only mounted with a Prometheus handle.
pub fn build_router(state: AppState, prometheus_handle: Option<PrometheusHandle>) -> Router {
    // Health check route
    let health_routes = Router::new().route("/health", get(health_check));

    // Call routes
    let call_routes = Router::new()
        .route("/sdp", post(negotiate_call))
        .route("/hangup", get(hangup_call).post(hangup_call))
        .route("/status", get(call_status));

    let mut router = Router::new()
        .merge(health_routes)
        .merge(call_routes)
        .with_state(state);

    // Metrics route (separate state)
    if let Some(handle) = prometheus_handle {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        );
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
