//! Prometheus metrics handler

use crate::domain::shared::{BridgeError, Result};
use crate::infrastructure::metrics::{
    ACTIVE_CALLS, BRIDGE_CHUNKS_DROPPED, CALLS_NEGOTIATED, CALLS_REJECTED, CALLS_TERMINATED,
    FRAMES_SENT, FRAME_ERRORS,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| BridgeError::Config(format!("metrics recorder: {}", e)))?;

    // Describe metrics
    describe_gauge!(ACTIVE_CALLS, "Number of currently registered calls");
    describe_counter!(CALLS_NEGOTIATED, "Total number of successful negotiations");
    describe_counter!(CALLS_REJECTED, "Total number of rejected negotiations");
    describe_counter!(CALLS_TERMINATED, "Total number of torn down calls");
    describe_counter!(
        BRIDGE_CHUNKS_DROPPED,
        "Audio chunks dropped because the bridge channel was full"
    );
    describe_counter!(FRAMES_SENT, "Outbound audio frames written to peers");
    describe_counter!(FRAME_ERRORS, "Per-frame audio failures");

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}
