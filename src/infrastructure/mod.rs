//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Signaling envelope codec
//! - WebRTC peer transport, handshake and state machine
//! - Media pipelines (recording, idle watchdog, outbound audio)
//! - Voice agent client
//! - Metric recording

pub mod agent;
pub mod media;
pub mod metrics;
pub mod protocols;
pub mod signaling;
