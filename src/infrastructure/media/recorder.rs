//! Inbound recorder
//!
//! Every remote audio track is written to its own OGG file in arrival
//! order until the track ends or the call is torn down.
//!
//! The sink is opened on the blocking pool. Page writes go through a
//! `BufWriter`, so the read loop only touches the disk once per buffer.

use super::watchdog::IdleWatchdog;
use crate::config::RecordingConfig;
use crate::domain::call::{CallSession, SessionRegistry};
use crate::domain::shared::{BridgeError, CallId, Result};
use crate::infrastructure::metrics;
use async_trait::async_trait;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Source of inbound media packets
#[async_trait]
pub trait PacketSource: Send + Sync {
    async fn read_packet(&self) -> Result<Packet>;
}

#[async_trait]
impl PacketSource for TrackRemote {
    async fn read_packet(&self) -> Result<Packet> {
        self.read_rtp()
            .await
            .map(|(packet, _)| packet)
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

/// OGG file sink, closed exactly once on `close` or drop
pub struct RecordingSink {
    path: PathBuf,
    writer: Option<OggWriter<BufWriter<File>>>,
    packets: u64,
}

impl RecordingSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::Transport(format!("create {}: {}", parent.display(), e)))?;
        }
        let channels = u8::try_from(channels)
            .map_err(|_| BridgeError::Config(format!("unsupported channel count: {}", channels)))?;
        let file = File::create(path)
            .map_err(|e| BridgeError::Transport(format!("create {}: {}", path.display(), e)))?;
        let writer = OggWriter::new(BufWriter::new(file), sample_rate, channels)
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            packets: 0,
        })
    }

    /// [`RecordingSink::create`] on the blocking pool
    pub async fn open(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::create(&path, sample_rate, channels))
            .await
            .map_err(|e| BridgeError::Transport(format!("open recording: {}", e)))?
    }

    pub fn write(&mut self, packet: &Packet) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BridgeError::Transport("recording already closed".into()))?;
        writer
            .write_rtp(packet)
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        self.packets += 1;
        Ok(())
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to close recording");
            }
        }
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wires remote tracks to recordings and the idle watchdog
pub struct InboundRecorder {
    config: RecordingConfig,
    idle_hangup: Duration,
    registry: Arc<SessionRegistry>,
}

impl InboundRecorder {
    pub fn new(config: RecordingConfig, idle_hangup: Duration, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            idle_hangup,
            registry,
        }
    }

    /// `<dir>/<prefix>-<call id>-<unix secs>.ogg`
    pub fn recording_path(&self, call_id: &CallId) -> PathBuf {
        self.config.directory.join(format!(
            "{}-{}-{}.ogg",
            self.config.file_prefix,
            call_id,
            chrono::Utc::now().timestamp()
        ))
    }

    /// Handle a newly announced remote track. Non-audio tracks are ignored.
    pub fn on_track(self: &Arc<Self>, session: Arc<CallSession>, track: Arc<TrackRemote>) {
        if track.kind() != RTPCodecType::Audio {
            debug!(call_id = %session.id(), kind = ?track.kind(), "Ignoring non-audio track");
            return;
        }
        info!(call_id = %session.id(), ssrc = track.ssrc(), "Inbound audio track");

        let recorder = self.clone();
        tokio::spawn(async move {
            recorder.record(session, track).await;
        });
    }

    /// Record `source` until it ends or the session is torn down
    pub async fn record<S>(&self, session: Arc<CallSession>, source: Arc<S>) -> Option<PathBuf>
    where
        S: PacketSource + ?Sized,
    {
        let call_id = session.id().clone();
        let path = self.recording_path(&call_id);

        let mut sink = match RecordingSink::open(path.clone(), self.config.sample_rate, self.config.channels).await {
            Ok(sink) => sink,
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Cannot open recording");
                return None;
            }
        };

        let watchdog = IdleWatchdog::arm(self.idle_hangup, session.clone(), self.registry.clone());

        loop {
            let packet = tokio::select! {
                biased;
                _ = session.done().closed() => break,
                packet = source.read_packet() => packet,
            };

            match packet {
                Ok(packet) => {
                    if let Some(watchdog) = &watchdog {
                        watchdog.kick();
                    }
                    if let Err(e) = sink.write(&packet) {
                        warn!(call_id = %call_id, error = %e, "Failed to record packet");
                        metrics::record_frame_error("record");
                    }
                }
                Err(e) => {
                    debug!(call_id = %call_id, error = %e, "Inbound track ended");
                    break;
                }
            }
        }

        sink.close();
        info!(
            call_id = %call_id,
            path = %sink.path().display(),
            packets = sink.packets(),
            "Recording closed"
        );
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::transport::MockPeerTransport;
    use crate::domain::call::TeardownCause;
    use bytes::Bytes;
    use tokio::sync::Mutex;
    use webrtc::rtp::header::Header;

    fn packet(seq: u16) -> Packet {
        Packet {
            header: Header {
                version: 2,
                payload_type: 111,
                sequence_number: seq,
                timestamp: seq as u32 * 960,
                ssrc: 7,
                ..Default::default()
            },
            payload: Bytes::from_static(&[0xf8, 0xff, 0xfe]),
        }
    }

    /// Yields queued packets, then either ends or stalls forever
    struct ScriptedSource {
        packets: Mutex<Vec<Packet>>,
        stall_when_empty: bool,
    }

    #[async_trait]
    impl PacketSource for ScriptedSource {
        async fn read_packet(&self) -> Result<Packet> {
            let next = self.packets.lock().await.pop();
            match next {
                Some(packet) => Ok(packet),
                None if self.stall_when_empty => std::future::pending().await,
                None => Err(BridgeError::Transport("EOF".into())),
            }
        }
    }

    fn recorder(dir: &Path, idle: Duration, registry: Arc<SessionRegistry>) -> InboundRecorder {
        InboundRecorder::new(
            RecordingConfig {
                directory: dir.join("recorder"),
                ..Default::default()
            },
            idle,
            registry,
        )
    }

    fn session(registry: &SessionRegistry, closes: usize) -> Arc<CallSession> {
        let mut transport = MockPeerTransport::new();
        transport.expect_close().times(closes).returning(|| Ok(()));
        registry.create(Arc::new(transport))
    }

    #[test]
    fn test_sink_writes_ogg_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.ogg");
        let mut sink = RecordingSink::create(&path, 48000, 2).unwrap();
        for seq in 0..3 {
            sink.write(&packet(seq)).unwrap();
        }
        assert_eq!(sink.packets(), 3);
        sink.close();
        sink.close();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
        assert!(sink.write(&packet(4)).is_err());
    }

    #[test]
    fn test_sink_rejects_wide_channel_count() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecordingSink::create(&dir.path().join("wide.ogg"), 48000, 300);
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[tokio::test]
    async fn test_records_until_track_ends() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 0);
        let recorder = recorder(dir.path(), Duration::ZERO, registry.clone());

        let mut packets: Vec<Packet> = (0..5).map(packet).collect();
        packets.reverse();
        let source = Arc::new(ScriptedSource {
            packets: Mutex::new(packets),
            stall_when_empty: false,
        });

        let path = recorder.record(session.clone(), source).await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&format!("audio-{}-", session.id())));
        assert!(name.ends_with(".ogg"));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        // End of track is not a reason to hang up.
        assert!(!session.done().is_closed());
    }

    #[tokio::test]
    async fn test_track_end_disarms_idle_hangup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 0);
        let recorder = recorder(dir.path(), Duration::from_millis(50), registry.clone());

        let source = Arc::new(ScriptedSource {
            packets: Mutex::new(vec![packet(0)]),
            stall_when_empty: false,
        });
        recorder.record(session.clone(), source).await.unwrap();

        // Well past the idle threshold, the call is still up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!session.done().is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 1);
        let recorder = Arc::new(recorder(dir.path(), Duration::ZERO, registry.clone()));

        let source = Arc::new(ScriptedSource {
            packets: Mutex::new(vec![packet(0)]),
            stall_when_empty: true,
        });
        let task = {
            let recorder = recorder.clone();
            let session = session.clone();
            tokio::spawn(async move { recorder.record(session, source).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.teardown(&session, TeardownCause::Hangup).await;

        let path = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&std::fs::read(path).unwrap()[..4], b"OggS");
    }

    #[tokio::test]
    async fn test_idle_track_triggers_hangup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 1);
        let recorder = Arc::new(recorder(dir.path(), Duration::from_millis(40), registry.clone()));

        let source = Arc::new(ScriptedSource {
            packets: Mutex::new(vec![packet(0)]),
            stall_when_empty: true,
        });
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            recorder.record(session.clone(), source),
        )
        .await
        .expect("idle hangup should stop the recording");

        assert!(result.is_some());
        assert!(session.done().is_closed());
    }
}
