//! HTTP error mapping

use super::dto::ApiResponse;
use crate::domain::shared::BridgeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Status class for a bridge error
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error rendered as a JSON `ApiResponse`
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

/// Error rendered as plain text, for clients that speak text envelopes
#[derive(Debug)]
pub struct TextError(pub BridgeError);

impl IntoResponse for TextError {
    fn into_response(self) -> Response {
        (status_for(&self.0), self.0.to_string()).into_response()
    }
}
