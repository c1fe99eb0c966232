//! Domain errors

use thiserror::Error;

/// Error taxonomy shared by the handshake, the registry and the media pipelines.
///
/// HTTP callers only ever see the coarse classes: `MalformedRequest` maps to a
/// client error, `NotFound` to not-found, everything else to a server error.
/// `TranscodeFrame` and `Agent` are contained inside the audio pipelines and
/// are only surfaced through logs and metrics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Call not found: {0}")]
    NotFound(String),

    #[error("Frame transcode error: {0}")]
    TranscodeFrame(String),

    #[error("Voice agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MalformedRequest(_) => "malformed_request",
            BridgeError::Transport(_) => "transport",
            BridgeError::Negotiation(_) => "negotiation",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::TranscodeFrame(_) => "transcode_frame",
            BridgeError::Agent(_) => "agent",
            BridgeError::Config(_) => "config",
        }
    }

    /// Whether the failure is attributable to the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedRequest(_) | BridgeError::NotFound(_)
        )
    }
}
