//! API DTOs

use crate::domain::shared::CallId;
use serde::{Deserialize, Serialize};

/// Generic JSON envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Active calls snapshot
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub active_calls: Vec<CallId>,
    pub count: usize,
}

impl StatusResponse {
    pub fn new(active_calls: Vec<CallId>) -> Self {
        let count = active_calls.len();
        Self { active_calls, count }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_calls: usize,
    pub version: String,
}

/// Query string of the termination endpoint
#[derive(Debug, Deserialize)]
pub struct HangupQuery {
    pub id: Option<String>,
}
