//! Call service

use crate::config::{Config, OutboundMode};
use crate::domain::call::{SessionRegistry, TeardownCause};
use crate::domain::shared::{CallId, Result};
use crate::infrastructure::agent::{VoiceAgentFactory, WebSocketAgentFactory};
use crate::infrastructure::protocols::webrtc::{NegotiatedCall, Negotiator};
use std::sync::Arc;
use tracing::info;

/// Entry point for every call operation exposed to clients
pub struct CallService {
    registry: Arc<SessionRegistry>,
    negotiator: Negotiator,
}

impl CallService {
    pub fn new(registry: Arc<SessionRegistry>, negotiator: Negotiator) -> Self {
        Self {
            registry,
            negotiator,
        }
    }

    /// Wire the registry, the voice agent and the handshake from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::new());

        let agents: Option<Arc<dyn VoiceAgentFactory>> = match config.outbound.mode {
            OutboundMode::Agent => Some(Arc::new(WebSocketAgentFactory::new(config.agent.clone()))),
            OutboundMode::None | OutboundMode::File => None,
        };

        let negotiator = Negotiator::new(config, registry.clone(), agents)?;
        Ok(Self::new(registry, negotiator))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Answer an offer and register the call
    pub async fn negotiate(&self, body: &str) -> Result<NegotiatedCall> {
        self.negotiator.negotiate(body).await
    }

    /// Hang up a call by identifier
    pub async fn terminate(&self, id: &CallId) -> Result<()> {
        self.registry.terminate(id, TeardownCause::Hangup).await?;
        info!(call_id = %id, "Call terminated by request");
        Ok(())
    }

    pub fn active_calls(&self) -> Vec<CallId> {
        self.registry.list()
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Tear down every active call
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.terminate_all(TeardownCause::Shutdown).await;
        info!(closed, "All calls terminated");
        closed
    }
}
