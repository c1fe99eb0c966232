//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST API endpoints
//! - Request/response formatting
//! - Error to status code mapping

pub mod api;
