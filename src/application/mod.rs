//! Application layer - Use cases and application services
//!
//! This layer orchestrates the registry and the handshake to serve the
//! negotiate / terminate / status use cases.

pub mod call_service;

pub use call_service::CallService;
