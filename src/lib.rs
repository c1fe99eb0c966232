//! VoiceBridge - A WebRTC voice call broker built with Rust
//!
//! Browsers post a compressed SDP offer, the broker answers it, records the
//! caller's audio and feeds the call with audio from a voice agent or a file.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::BridgeError;
pub use domain::shared::result::Result;
