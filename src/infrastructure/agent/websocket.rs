//! WebSocket voice agent
//!
//! Speaks a minimal protocol: after connecting we send a JSON `start`
//! message, the agent replies with binary frames of PCM audio and optional
//! JSON text events.

use super::{VoiceAgent, VoiceAgentFactory};
use crate::config::AgentConfig;
use crate::domain::audio::pcm::{bytes_to_f32, float_to_pcm16_bytes};
use crate::domain::shared::{BridgeError, CallId, Result};
use crate::infrastructure::media::bridge_channel::{BridgeSender, SendOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// PCM layout of the agent's binary frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEncoding {
    /// Little-endian signed 16-bit
    PcmS16le,
    /// Little-endian 32-bit float
    F32le,
}

impl AgentEncoding {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pcm_s16le" => Ok(AgentEncoding::PcmS16le),
            "f32le" => Ok(AgentEncoding::F32le),
            other => Err(BridgeError::Config(format!("unknown agent encoding: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEncoding::PcmS16le => "pcm_s16le",
            AgentEncoding::F32le => "f32le",
        }
    }
}

#[derive(Debug, Serialize)]
struct StartMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    call_id: &'a str,
    sample_rate: u32,
    channels: u16,
    encoding: &'static str,
}

pub struct WebSocketAgent {
    config: AgentConfig,
    call_id: CallId,
    sink: Option<SplitSink<WsStream, Message>>,
    stream: Option<SplitStream<WsStream>>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketAgent {
    pub fn new(config: AgentConfig, call_id: CallId) -> Self {
        Self {
            config,
            call_id,
            sink: None,
            stream: None,
            reader: None,
        }
    }

    fn encoding(&self) -> Result<AgentEncoding> {
        AgentEncoding::parse(&self.config.encoding)
    }
}

#[async_trait]
impl VoiceAgent for WebSocketAgent {
    async fn connect(&mut self) -> Result<()> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| BridgeError::Agent(format!("invalid agent url: {}", e)))?;

        if let Some(token) = &self.config.access_token {
            let value = format!("Bearer {}", token)
                .parse()
                .map_err(|_| BridgeError::Agent("access token is not a valid header value".into()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = tokio::time::timeout(self.config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| BridgeError::Agent("connect timed out".into()))?
            .map_err(|e| BridgeError::Agent(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        self.sink = Some(sink);
        self.stream = Some(stream);

        info!(call_id = %self.call_id, url = %self.config.url, "Connected to voice agent");
        Ok(())
    }

    async fn initialize_audio(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        let encoding = self.encoding()?;
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| BridgeError::Agent("not connected".into()))?;

        let start = StartMessage {
            kind: "start",
            call_id: self.call_id.as_str(),
            sample_rate,
            channels,
            encoding: encoding.as_str(),
        };
        let text = serde_json::to_string(&start).map_err(|e| BridgeError::Agent(e.to_string()))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| BridgeError::Agent(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&mut self, bridge: BridgeSender) -> Result<()> {
        let encoding = self.encoding()?;
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| BridgeError::Agent("not connected".into()))?;
        let call_id = self.call_id.clone();

        self.reader = Some(tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        let chunk = match encoding {
                            AgentEncoding::PcmS16le => Bytes::from(data),
                            AgentEncoding::F32le => {
                                Bytes::from(float_to_pcm16_bytes(&bytes_to_f32(&data)))
                            }
                        };
                        match bridge.offer(chunk) {
                            SendOutcome::Closed => break,
                            SendOutcome::Overloaded => {
                                warn!(call_id = %call_id, dropped = bridge.stats().dropped(), "Outbound bridge overloaded");
                            }
                            SendOutcome::Sent | SendOutcome::Dropped => {}
                        }
                    }
                    Ok(Message::Text(event)) => {
                        debug!(call_id = %call_id, event = %event, "Voice agent event");
                    }
                    Ok(Message::Close(_)) => {
                        info!(call_id = %call_id, "Voice agent closed the stream");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(call_id = %call_id, error = %e, "Voice agent stream error");
                        break;
                    }
                }
            }
            // Dropping `bridge` here closes the channel for the frame pump.
        }));

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.stream = None;

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(call_id = %self.call_id, error = %e, "Voice agent close failed");
            }
        }
        info!(call_id = %self.call_id, "Disconnected from voice agent");
        Ok(())
    }
}

impl Drop for WebSocketAgent {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Builds a [`WebSocketAgent`] per call from shared configuration
pub struct WebSocketAgentFactory {
    config: AgentConfig,
}

impl WebSocketAgentFactory {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

impl VoiceAgentFactory for WebSocketAgentFactory {
    fn create(&self, call_id: &CallId) -> Box<dyn VoiceAgent> {
        Box::new(WebSocketAgent::new(self.config.clone(), call_id.clone()))
    }
}
