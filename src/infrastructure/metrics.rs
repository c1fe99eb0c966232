//! Metric recording helpers
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op.

use metrics::{counter, gauge};

pub const ACTIVE_CALLS: &str = "voicebridge_active_calls";
pub const CALLS_NEGOTIATED: &str = "voicebridge_calls_negotiated_total";
pub const CALLS_REJECTED: &str = "voicebridge_calls_rejected_total";
pub const CALLS_TERMINATED: &str = "voicebridge_calls_terminated_total";
pub const BRIDGE_CHUNKS_DROPPED: &str = "voicebridge_bridge_chunks_dropped_total";
pub const FRAMES_SENT: &str = "voicebridge_frames_sent_total";
pub const FRAME_ERRORS: &str = "voicebridge_frame_errors_total";

/// Update active calls gauge
pub fn update_active_calls(count: usize) {
    gauge!(ACTIVE_CALLS).set(count as f64);
}

/// Record a completed handshake
pub fn record_call_negotiated() {
    counter!(CALLS_NEGOTIATED).increment(1);
}

/// Record a rejected negotiation request
pub fn record_call_rejected(reason: &str) {
    counter!(CALLS_REJECTED, "reason" => reason.to_string()).increment(1);
}

/// Record a session teardown
pub fn record_call_terminated(cause: &str) {
    counter!(CALLS_TERMINATED, "cause" => cause.to_string()).increment(1);
}

pub fn record_chunk_dropped() {
    counter!(BRIDGE_CHUNKS_DROPPED).increment(1);
}

pub fn record_frame_sent() {
    counter!(FRAMES_SENT).increment(1);
}

/// Record a per-frame failure. `stage` is `encode`, `write` or `read`.
pub fn record_frame_error(stage: &str) {
    counter!(FRAME_ERRORS, "stage" => stage.to_string()).increment(1);
}
