//! API interface implementations

pub mod calls_handler;
pub mod dto;
pub mod error;
pub mod metrics_handler;
pub mod router;

pub use calls_handler::CALL_ID_HEADER;
pub use metrics_handler::init_metrics;
pub use router::{build_router, AppState};
