//! Outbound sample track

use crate::domain::shared::{BridgeError, CallId, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Sink for encoded media units with their nominal duration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SampleWriter: Send + Sync {
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()>;
}

/// Build the local Opus track attached to a bidirectional transceiver
pub fn new_opus_track(call_id: &CallId, sample_rate: u32, channels: u16) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: sample_rate,
            channels,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        "audio".to_owned(),
        format!("voicebridge-{}", call_id),
    ))
}

/// Writes samples onto a transceiver's local track
pub struct LocalSampleTrack {
    track: Arc<dyn TrackLocal + Send + Sync>,
}

impl LocalSampleTrack {
    /// Wrap `track` if it accepts whole samples. Packet-level tracks are rejected.
    pub fn from_track(track: Arc<dyn TrackLocal + Send + Sync>) -> Option<Self> {
        if track.as_any().downcast_ref::<TrackLocalStaticSample>().is_none() {
            return None;
        }
        Some(Self { track })
    }

    pub fn track_id(&self) -> &str {
        self.track.id()
    }
}

#[async_trait]
impl SampleWriter for LocalSampleTrack {
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        let track = self
            .track
            .as_any()
            .downcast_ref::<TrackLocalStaticSample>()
            .ok_or_else(|| BridgeError::Transport("outbound track is not sample-writable".into()))?;

        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}
