//! Configuration management
//!
//! Values are layered: built-in defaults, then `config/default.toml` and
//! `config/local.toml` when present, then `VOICEBRIDGE__SECTION__KEY`
//! environment variables.

use crate::domain::shared::{BridgeError, Result};
use crate::infrastructure::media::codec::OpusConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VOICEBRIDGE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub webrtc: WebRtcConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub call: CallConfig,
    pub outbound: OutboundConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Restrict candidate gathering to UDP over IPv4
    pub udp4_only: bool,
    /// Answer as the DTLS client (`a=setup:active`)
    pub dtls_client_role: bool,
    /// Wall-clock guard on local candidate gathering
    pub gather_timeout_secs: u64,
    pub ice_candidate_pool_size: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,
    pub bitrate: u32,
    /// Bridge channel capacity in chunks
    pub bridge_capacity: usize,
    /// Consecutive dropped chunks before the call is torn down; 0 disables
    pub max_consecutive_drops: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub directory: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Hang up when no inbound audio arrives for this long; 0 disables
    pub idle_hangup_secs: u64,
}

/// Where outbound audio comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundMode {
    /// Receive only
    #[default]
    None,
    /// Stream the voice agent's audio
    Agent,
    /// Play an OGG/Opus file
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    pub mode: OutboundMode,
    pub file_path: PathBuf,
    /// Stop file playback after this long; 0 plays to the end
    pub timeout_secs: u64,
    /// Tear the call down when playback times out
    pub close_on_timeout: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub url: String,
    pub access_token: Option<String>,
    pub connect_timeout_secs: u64,
    /// `pcm_s16le` or `f32le`
    pub encoding: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![
                    "stun:stun.l.google.com:19302".to_string(),
                    "stun:stun.l.google.com:19305".to_string(),
                ],
                username: None,
                credential: None,
            }],
            udp4_only: true,
            dtls_client_role: true,
            gather_timeout_secs: 10,
            ice_candidate_pool_size: 0,
        }
    }
}

impl WebRtcConfig {
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_duration_ms: 20,
            bitrate: 64000,
            bridge_capacity: 100,
            max_consecutive_drops: 0,
        }
    }
}

impl AudioConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("recorder"),
            sample_rate: 48000,
            channels: 2,
            file_prefix: "audio".to_string(),
        }
    }
}

impl CallConfig {
    pub fn idle_hangup(&self) -> Duration {
        Duration::from_secs(self.idle_hangup_secs)
    }
}

impl OutboundConfig {
    /// Whether the transceiver must be able to send
    pub fn sends_audio(&self) -> bool {
        self.mode != OutboundMode::None
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8081/audio".to_string(),
            access_token: None,
            connect_timeout_secs: 10,
            encoding: "pcm_s16le".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from files in `config/` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration with files looked up under `dir`
    pub fn load_from(dir: &str) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Config::default())
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        let config: Config = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(::config::File::with_name(&format!("{}/local", dir)).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the media pipelines cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.audio.frame_duration_ms == 0 {
            return Err(BridgeError::Config("audio.frame_duration_ms must be positive".into()));
        }
        if self.audio.bridge_capacity == 0 {
            return Err(BridgeError::Config("audio.bridge_capacity must be positive".into()));
        }
        if self.recording.channels == 0 || self.recording.channels > 2 {
            return Err(BridgeError::Config("recording.channels must be 1 or 2".into()));
        }
        if self.outbound.mode == OutboundMode::File && self.outbound.file_path.as_os_str().is_empty() {
            return Err(BridgeError::Config("outbound.file_path is required in file mode".into()));
        }
        if self.outbound.mode == OutboundMode::Agent && self.agent.url.is_empty() {
            return Err(BridgeError::Config("agent.url is required in agent mode".into()));
        }
        if self.outbound.mode == OutboundMode::Agent {
            OpusConfig::from(&self.audio)
                .validate()
                .map_err(|e| BridgeError::Config(format!("audio: {}", e)))?;
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.frame_duration(), Duration::from_millis(20));
        assert_eq!(config.audio.bridge_capacity, 100);
        assert_eq!(config.recording.channels, 2);
        assert_eq!(config.outbound.mode, OutboundMode::None);
        assert!(!config.outbound.sends_audio());
        assert_eq!(config.webrtc.ice_servers[0].urls.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.webrtc.gather_timeout_secs, 10);
    }

    #[test]
    fn test_load_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[server]
port = 9090

[outbound]
mode = "file"
file_path = "prompts/welcome.ogg"
timeout_secs = 30
close_on_timeout = true

[call]
idle_hangup_secs = 15
"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.outbound.mode, OutboundMode::File);
        assert_eq!(config.outbound.timeout(), Some(Duration::from_secs(30)));
        assert!(config.outbound.close_on_timeout);
        assert_eq!(config.call.idle_hangup(), Duration::from_secs(15));
    }

    #[test]
    fn test_agent_mode_checks_opus_limits() {
        let mut config = Config::default();
        config.outbound.mode = OutboundMode::Agent;
        assert!(config.validate().is_ok());

        config.audio.sample_rate = 44100;
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        // Receive-only calls never encode.
        config.outbound.mode = OutboundMode::None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_mode_requires_path() {
        let mut config = Config::default();
        config.outbound.mode = OutboundMode::File;
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }
}
