//! Opus Audio Codec
//!
//! Outbound frames are encoded with libopus through the `opus` crate. One
//! call to [`FrameEncoder::encode`] consumes exactly one frame of interleaved
//! PCM and produces one Opus packet.

use crate::config::AudioConfig;
use crate::domain::shared::{BridgeError, Result};
use bytes::Bytes;
use std::fmt;

/// Largest packet libopus produces for a single frame
const MAX_PACKET_SIZE: usize = 1500;

/// Opus codec configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusConfig {
    /// Sampling rate in Hz (8000, 12000, 16000, 24000, or 48000)
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Bitrate in bits per second (6000-510000)
    pub bitrate: u32,
    /// Frame duration in milliseconds (10, 20, 40, 60)
    pub frame_duration_ms: u32,
    /// Application mode
    pub application: OpusApplication,
    /// Enable Forward Error Correction
    pub fec_enabled: bool,
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            bitrate: 64000,
            frame_duration_ms: 20,
            application: OpusApplication::Voip,
            fec_enabled: true,
        }
    }
}

impl From<&AudioConfig> for OpusConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            bitrate: audio.bitrate,
            frame_duration_ms: audio.frame_duration_ms,
            ..Default::default()
        }
    }
}

impl OpusConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.sample_rate {
            8000 | 12000 | 16000 | 24000 | 48000 => {}
            _ => return Err(format!("Invalid sample rate: {}", self.sample_rate)),
        }

        if self.channels < 1 || self.channels > 2 {
            return Err(format!("Invalid channels: {}", self.channels));
        }

        if self.bitrate < 6000 || self.bitrate > 510000 {
            return Err(format!("Invalid bitrate: {}", self.bitrate));
        }

        match self.frame_duration_ms {
            10 | 20 | 40 | 60 => {}
            _ => return Err(format!("Invalid frame duration: {}ms", self.frame_duration_ms)),
        }

        Ok(())
    }

    /// Frame size in samples per channel
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }
}

/// Opus application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpusApplication {
    /// Optimize for VoIP/speech
    Voip,
    /// Optimize for general audio
    Audio,
    /// Optimize for low delay
    RestrictedLowdelay,
}

impl From<OpusApplication> for ::opus::Application {
    fn from(app: OpusApplication) -> Self {
        match app {
            OpusApplication::Voip => ::opus::Application::Voip,
            OpusApplication::Audio => ::opus::Application::Audio,
            OpusApplication::RestrictedLowdelay => ::opus::Application::LowDelay,
        }
    }
}

impl fmt::Display for OpusApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpusApplication::Voip => write!(f, "voip"),
            OpusApplication::Audio => write!(f, "audio"),
            OpusApplication::RestrictedLowdelay => write!(f, "restricted-lowdelay"),
        }
    }
}

/// Encodes one PCM frame into one codec packet
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes>;
}

/// libopus-backed frame encoder
pub struct OpusFrameEncoder {
    config: OpusConfig,
    encoder: ::opus::Encoder,
    buffer: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new(config: OpusConfig) -> Result<Self> {
        config.validate().map_err(BridgeError::Config)?;

        let channels = if config.channels == 2 {
            ::opus::Channels::Stereo
        } else {
            ::opus::Channels::Mono
        };

        let mut encoder = ::opus::Encoder::new(config.sample_rate, channels, config.application.into())
            .map_err(|e| BridgeError::TranscodeFrame(format!("encoder init: {}", e)))?;
        encoder
            .set_bitrate(::opus::Bitrate::Bits(config.bitrate as i32))
            .map_err(|e| BridgeError::TranscodeFrame(format!("set bitrate: {}", e)))?;
        encoder
            .set_inband_fec(config.fec_enabled)
            .map_err(|e| BridgeError::TranscodeFrame(format!("set fec: {}", e)))?;

        Ok(Self {
            config,
            encoder,
            buffer: vec![0u8; MAX_PACKET_SIZE],
        })
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
        let expected = self.config.frame_size() * self.config.channels as usize;
        if pcm.len() != expected {
            return Err(BridgeError::TranscodeFrame(format!(
                "frame has {} samples, encoder expects {}",
                pcm.len(),
                expected
            )));
        }

        let len = self
            .encoder
            .encode(pcm, &mut self.buffer)
            .map_err(|e| BridgeError::TranscodeFrame(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&self.buffer[..len]))
    }
}
