//! Voice agent collaborator
//!
//! The outbound pipeline only ever sees a voice agent through this trait:
//! it connects, announces the audio format, then hands over the producer
//! end of a bridge channel. Decoded PCM flows back exclusively through that
//! channel.

pub mod websocket;

use crate::domain::shared::{CallId, Result};
use crate::infrastructure::media::bridge_channel::BridgeSender;
use async_trait::async_trait;

pub use websocket::{WebSocketAgent, WebSocketAgentFactory};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceAgent: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Announce the PCM format the bridge expects
    async fn initialize_audio(&mut self, sample_rate: u32, channels: u16) -> Result<()>;

    /// Start feeding PCM chunks into `sink`
    async fn subscribe(&mut self, sink: BridgeSender) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Creates one voice agent connection per call
#[cfg_attr(test, mockall::automock)]
pub trait VoiceAgentFactory: Send + Sync {
    fn create(&self, call_id: &CallId) -> Box<dyn VoiceAgent>;
}
