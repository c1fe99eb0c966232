//! Peer transport backed by `webrtc`

use crate::config::WebRtcConfig;
use crate::domain::call::{ConnectionState, IceConnectionState, PeerTransport};
use crate::domain::shared::{BridgeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::dtls_transport::dtls_role::DTLSRole;
use webrtc::ice::network_type::NetworkType;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Build the shared `webrtc` API object
pub fn build_api(config: &WebRtcConfig) -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| BridgeError::Transport(format!("register codecs: {}", e)))?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| BridgeError::Transport(format!("register interceptors: {}", e)))?;

    let mut setting_engine = SettingEngine::default();
    if config.udp4_only {
        setting_engine.set_network_types(vec![NetworkType::Udp4]);
    }
    if config.dtls_client_role {
        setting_engine
            .set_answering_dtls_role(DTLSRole::Client)
            .map_err(|e| BridgeError::Transport(format!("dtls role: {}", e)))?;
    }

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .with_setting_engine(setting_engine)
        .build())
}

/// Peer connection configuration from the ICE server list
pub fn rtc_configuration(config: &WebRtcConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect(),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        ..Default::default()
    }
}

/// Creates peer connections for incoming calls
pub struct PeerFactory {
    api: API,
    rtc_config: RTCConfiguration,
}

impl PeerFactory {
    pub fn new(config: &WebRtcConfig) -> Result<Self> {
        Ok(Self {
            api: build_api(config)?,
            rtc_config: rtc_configuration(config),
        })
    }

    pub async fn create(&self) -> Result<Arc<RTCPeerConnection>> {
        let pc = self
            .api
            .new_peer_connection(self.rtc_config.clone())
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        Ok(Arc::new(pc))
    }
}

/// A call's peer connection as seen by the session lifecycle
pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
}

impl RtcTransport {
    pub fn new(pc: Arc<RTCPeerConnection>) -> Self {
        Self { pc }
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn close(&self) -> Result<()> {
        debug!("Closing peer connection");
        self.pc
            .close()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::New => IceConnectionState::New,
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::Unknown,
        }
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => ConnectionState::New,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::Unknown,
        }
    }
}
