//! Domain layer - Core types and rules
//!
//! This layer contains:
//! - Shared kernel: call identifiers and the error taxonomy
//! - Call: sessions, the session registry and transport transitions
//! - Audio: PCM conversion and frame assembly
//!
//! Nothing in here performs network or file I/O.

pub mod audio;
pub mod call;
pub mod shared;

// Re-export commonly used types
pub use shared::{BridgeError, CallId, Result};
