//! Call API handlers

use super::dto::{ApiResponse, HangupQuery, HealthResponse, StatusResponse};
use super::error::{ApiError, TextError};
use super::router::AppState;
use crate::domain::shared::{BridgeError, CallId};
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

/// Response header carrying the new call's identifier
pub const CALL_ID_HEADER: &str = "x-call-id";

/// Negotiate a call: `<offer>;<candidates>` in, `<answer>;<candidates>` out
pub async fn negotiate_call(State(state): State<AppState>, body: String) -> Response {
    info!(bytes = body.len(), "API: Negotiating call");

    match state.calls.negotiate(&body).await {
        Ok(call) => {
            let call_id = match HeaderValue::from_str(call.call_id.as_str()) {
                Ok(value) => value,
                Err(_) => {
                    return TextError(BridgeError::Negotiation("invalid call id".into())).into_response()
                }
            };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
                    (HeaderName::from_static(CALL_ID_HEADER), call_id),
                ],
                call.body,
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "API: Negotiation failed");
            TextError(e).into_response()
        }
    }
}

/// Hang up a call by `?id=`
pub async fn hangup_call(
    State(state): State<AppState>,
    Query(query): Query<HangupQuery>,
) -> Result<&'static str, ApiError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| BridgeError::MalformedRequest("missing call id".into()))?;

    info!(call_id = %id, "API: Hanging up call");
    state.calls.terminate(&CallId::from(id)).await?;
    Ok("OK")
}

/// List active calls
pub async fn call_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::new(state.calls.active_calls()))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        active_calls: state.calls.active_count(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
