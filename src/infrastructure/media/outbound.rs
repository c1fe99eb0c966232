//! Outbound audio pipeline
//!
//! Started once per call when ICE connectivity is established. Depending on
//! configuration it either streams the voice agent's PCM through a bridge
//! channel, the frame assembler and the Opus encoder, or plays an OGG file.

use super::bridge_channel::{bridge_channel, BridgeReceiver};
use super::codec::{FrameEncoder, OpusConfig, OpusFrameEncoder};
use super::playback::{play_ogg_file, PlaybackOptions};
use super::track::{LocalSampleTrack, SampleWriter};
use crate::config::{AudioConfig, OutboundConfig, OutboundMode};
use crate::domain::audio::{FrameAssembler, FrameSpec};
use crate::domain::call::{CallSession, CompletionSignal, SessionRegistry, TeardownCause};
use crate::domain::shared::{CallId, Result};
use crate::infrastructure::agent::{VoiceAgent, VoiceAgentFactory};
use crate::infrastructure::metrics;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use webrtc::rtp_transceiver::RTCRtpTransceiver;

/// Starts the outbound half of a call's audio bridge
pub trait OutboundLauncher: Send + Sync {
    fn launch(self: Arc<Self>, session: Arc<CallSession>);
}

/// Why a frame pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The session was torn down
    Cancelled,
    /// Every producer is gone
    ChannelClosed,
    /// The producer crossed the consecutive-drop threshold
    Overloaded,
}

/// Turns a stream of PCM chunks into paced, encoded frames
pub struct FramePump {
    call_id: CallId,
    assembler: FrameAssembler,
    encoder: Box<dyn FrameEncoder>,
    writer: Arc<dyn SampleWriter>,
    frame_duration: Duration,
    pacer: Option<Interval>,
    frames_sent: u64,
}

impl FramePump {
    pub fn new(
        call_id: CallId,
        spec: FrameSpec,
        encoder: Box<dyn FrameEncoder>,
        writer: Arc<dyn SampleWriter>,
    ) -> Self {
        Self {
            call_id,
            assembler: FrameAssembler::new(spec),
            encoder,
            writer,
            frame_duration: spec.frame_duration,
            pacer: None,
            frames_sent: 0,
        }
    }

    /// Emit at most one frame per frame duration
    pub fn paced(mut self) -> Self {
        let mut pacer = interval(self.frame_duration);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.pacer = Some(pacer);
        self
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Consume chunks until the session ends, the channel closes or overload is reported
    pub async fn run(&mut self, mut rx: BridgeReceiver, done: &CompletionSignal) -> PumpExit {
        let exit = loop {
            let chunk = tokio::select! {
                biased;
                _ = done.closed() => break PumpExit::Cancelled,
                chunk = rx.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                break PumpExit::ChannelClosed;
            };
            if rx.is_overloaded() {
                break PumpExit::Overloaded;
            }

            self.assembler.push_bytes(&chunk);
            while let Some(frame) = self.assembler.next_frame() {
                if !self.dispatch(&frame, done).await {
                    break;
                }
            }
            if done.is_closed() {
                break PumpExit::Cancelled;
            }
        };

        rx.close();
        debug!(
            call_id = %self.call_id,
            ?exit,
            frames = self.frames_sent,
            dropped = rx.stats().dropped(),
            "Frame pump stopped"
        );
        exit
    }

    /// Encode and write one frame. Returns `false` once the session is done.
    async fn dispatch(&mut self, frame: &[i16], done: &CompletionSignal) -> bool {
        if let Some(pacer) = self.pacer.as_mut() {
            tokio::select! {
                biased;
                _ = done.closed() => return false,
                _ = pacer.tick() => {}
            }
        }

        let packet = match self.encoder.encode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Dropping frame after encode failure");
                metrics::record_frame_error("encode");
                return true;
            }
        };

        match self.writer.write_sample(packet, self.frame_duration).await {
            Ok(()) => {
                self.frames_sent += 1;
                metrics::record_frame_sent();
            }
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Failed to write outbound frame");
                metrics::record_frame_error("write");
            }
        }
        true
    }
}

/// Outbound launcher bound to one call's transceiver
pub struct OutboundAudio {
    audio: AudioConfig,
    outbound: OutboundConfig,
    registry: Arc<SessionRegistry>,
    agents: Option<Arc<dyn VoiceAgentFactory>>,
    transceiver: OnceLock<Arc<RTCRtpTransceiver>>,
}

impl OutboundAudio {
    pub fn new(
        audio: AudioConfig,
        outbound: OutboundConfig,
        registry: Arc<SessionRegistry>,
        agents: Option<Arc<dyn VoiceAgentFactory>>,
    ) -> Self {
        Self {
            audio,
            outbound,
            registry,
            agents,
            transceiver: OnceLock::new(),
        }
    }

    /// Bind the transceiver created during negotiation
    pub fn bind_transceiver(&self, transceiver: Arc<RTCRtpTransceiver>) {
        if self.transceiver.set(transceiver).is_err() {
            warn!("Outbound transceiver already bound");
        }
    }

    async fn resolve_writer(&self, call_id: &CallId) -> Option<Arc<LocalSampleTrack>> {
        let Some(transceiver) = self.transceiver.get() else {
            warn!(call_id = %call_id, "No transceiver bound, outbound audio disabled");
            return None;
        };

        let sender = transceiver.sender().await;
        let Some(track) = sender.track().await else {
            warn!(call_id = %call_id, "Transceiver has no local track, outbound audio disabled");
            return None;
        };

        match LocalSampleTrack::from_track(track) {
            Some(writer) => Some(Arc::new(writer)),
            None => {
                warn!(call_id = %call_id, "Local track is not sample-writable, outbound audio disabled");
                None
            }
        }
    }

    async fn run(self: Arc<Self>, session: Arc<CallSession>) {
        let call_id = session.id().clone();
        let Some(writer) = self.resolve_writer(&call_id).await else {
            return;
        };

        match self.outbound.mode {
            OutboundMode::None => {}
            OutboundMode::File => {
                let options = PlaybackOptions {
                    path: self.outbound.file_path.clone(),
                    frame_duration: self.audio.frame_duration(),
                    timeout: self.outbound.timeout(),
                    close_on_timeout: self.outbound.close_on_timeout,
                };
                play_ogg_file(session, self.registry.clone(), writer, options).await;
            }
            OutboundMode::Agent => {
                let Some(agents) = self.agents.clone() else {
                    warn!(call_id = %call_id, "Agent mode without a voice agent factory");
                    return;
                };
                let mut agent = agents.create(&call_id);
                run_agent_bridge(&session, &self.registry, &self.audio, agent.as_mut(), writer).await;
            }
        }
    }
}

impl OutboundLauncher for OutboundAudio {
    fn launch(self: Arc<Self>, session: Arc<CallSession>) {
        if self.outbound.mode == OutboundMode::None {
            return;
        }
        info!(call_id = %session.id(), mode = ?self.outbound.mode, "Starting outbound audio");
        tokio::spawn(self.run(session));
    }
}

/// Bridge a voice agent onto the outbound track until the session ends
pub async fn run_agent_bridge(
    session: &CallSession,
    registry: &SessionRegistry,
    audio: &AudioConfig,
    agent: &mut dyn VoiceAgent,
    writer: Arc<dyn SampleWriter>,
) -> Option<PumpExit> {
    let call_id = session.id().clone();
    let (tx, rx) = bridge_channel(audio.bridge_capacity, audio.max_consecutive_drops);

    let setup = async {
        agent.connect().await?;
        agent.initialize_audio(audio.sample_rate, audio.channels).await?;
        agent.subscribe(tx).await
    };
    let connected: Result<()> = tokio::select! {
        biased;
        _ = session.done().closed() => return None,
        result = setup => result,
    };
    if let Err(e) = connected {
        // The call stays up with inbound audio only.
        warn!(call_id = %call_id, error = %e, "Voice agent unavailable");
        let _ = agent.disconnect().await;
        return None;
    }

    let encoder = match OpusFrameEncoder::new(OpusConfig::from(audio)) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(call_id = %call_id, error = %e, "Cannot create Opus encoder");
            let _ = agent.disconnect().await;
            return None;
        }
    };

    let spec = FrameSpec::new(audio.sample_rate, audio.channels, audio.frame_duration());
    let mut pump = FramePump::new(call_id.clone(), spec, Box::new(encoder), writer).paced();
    let exit = pump.run(rx, session.done()).await;

    if let Err(e) = agent.disconnect().await {
        debug!(call_id = %call_id, error = %e, "Voice agent disconnect failed");
    }

    if exit == PumpExit::Overloaded {
        registry.teardown(session, TeardownCause::BridgeOverload).await;
    }
    Some(exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::transport::MockPeerTransport;
    use crate::domain::shared::BridgeError;
    use crate::infrastructure::agent::MockVoiceAgent;
    use crate::infrastructure::media::track::MockSampleWriter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Passes the first sample of each frame through as the packet
    struct TagEncoder {
        fail_on: Option<i16>,
    }

    impl FrameEncoder for TagEncoder {
        fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
            if Some(pcm[0]) == self.fail_on {
                return Err(BridgeError::TranscodeFrame("boom".into()));
            }
            Ok(Bytes::from(crate::domain::audio::pcm::samples_to_bytes(pcm)))
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        samples: Mutex<Vec<(Bytes, Duration)>>,
    }

    #[async_trait]
    impl SampleWriter for RecordingWriter {
        async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
            self.samples.lock().unwrap().push((data, duration));
            Ok(())
        }
    }

    fn spec() -> FrameSpec {
        FrameSpec::new(8000, 1, Duration::from_millis(10))
    }

    fn frame_bytes(value: i16) -> Vec<u8> {
        crate::domain::audio::pcm::samples_to_bytes(&[value; 80])
    }

    #[tokio::test]
    async fn test_pump_emits_whole_frames_in_order() {
        let writer = Arc::new(RecordingWriter::default());
        let mut pump = FramePump::new(
            CallId::from("1-1"),
            spec(),
            Box::new(TagEncoder { fail_on: None }),
            writer.clone(),
        );
        let (tx, rx) = bridge_channel(16, 0);
        let done = CompletionSignal::new();

        let mut stream = Vec::new();
        for v in 1..=3 {
            stream.extend(frame_bytes(v));
        }
        for chunk in stream.chunks(50) {
            tx.offer(Bytes::copy_from_slice(chunk));
        }
        drop(tx);

        assert_eq!(pump.run(rx, &done).await, PumpExit::ChannelClosed);
        let samples = writer.samples.lock().unwrap();
        assert_eq!(samples.len(), 3);
        for (i, (data, duration)) in samples.iter().enumerate() {
            assert_eq!(data.as_ref(), frame_bytes(i as i16 + 1).as_slice());
            assert_eq!(*duration, Duration::from_millis(10));
        }
        assert_eq!(pump.frames_sent(), 3);
    }

    #[tokio::test]
    async fn test_encode_failure_skips_only_that_frame() {
        let writer = Arc::new(RecordingWriter::default());
        let mut pump = FramePump::new(
            CallId::from("1-1"),
            spec(),
            Box::new(TagEncoder { fail_on: Some(2) }),
            writer.clone(),
        );
        let (tx, rx) = bridge_channel(16, 0);
        for v in 1..=3 {
            tx.offer(Bytes::from(frame_bytes(v)));
        }
        drop(tx);

        pump.run(rx, &CompletionSignal::new()).await;
        let samples = writer.samples.lock().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].0.as_ref(), frame_bytes(3).as_slice());
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_pump() {
        let mut writer = MockSampleWriter::new();
        writer
            .expect_write_sample()
            .times(2)
            .returning(|_, _| Err(BridgeError::Transport("closed pipe".into())));
        let mut pump = FramePump::new(
            CallId::from("1-1"),
            spec(),
            Box::new(TagEncoder { fail_on: None }),
            Arc::new(writer),
        );
        let (tx, rx) = bridge_channel(16, 0);
        tx.offer(Bytes::from(frame_bytes(1)));
        tx.offer(Bytes::from(frame_bytes(2)));
        drop(tx);

        assert_eq!(pump.run(rx, &CompletionSignal::new()).await, PumpExit::ChannelClosed);
        assert_eq!(pump.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_pump_stops_on_completion() {
        let writer = Arc::new(RecordingWriter::default());
        let mut pump = FramePump::new(
            CallId::from("1-1"),
            spec(),
            Box::new(TagEncoder { fail_on: None }),
            writer,
        )
        .paced();
        let (tx, rx) = bridge_channel(16, 0);
        let done = Arc::new(CompletionSignal::new());

        let closer = {
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.close();
            })
        };

        let exit = tokio::time::timeout(Duration::from_secs(1), pump.run(rx, &done))
            .await
            .expect("pump must observe completion");
        assert_eq!(exit, PumpExit::Cancelled);
        assert!(tx.is_closed());
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_reports_overload() {
        let writer = Arc::new(RecordingWriter::default());
        let mut pump = FramePump::new(
            CallId::from("1-1"),
            spec(),
            Box::new(TagEncoder { fail_on: None }),
            writer,
        );
        let (tx, rx) = bridge_channel(1, 2);
        tx.offer(Bytes::from_static(&[0, 0]));
        tx.offer(Bytes::from_static(&[0, 0]));
        tx.offer(Bytes::from_static(&[0, 0]));

        assert_eq!(pump.run(rx, &CompletionSignal::new()).await, PumpExit::Overloaded);
    }

    #[tokio::test]
    async fn test_unreachable_agent_leaves_call_up() {
        let registry = SessionRegistry::new();
        let mut transport = MockPeerTransport::new();
        transport.expect_close().times(0);
        let session = registry.create(Arc::new(transport));

        let mut agent = MockVoiceAgent::new();
        agent
            .expect_connect()
            .times(1)
            .returning(|| Err(BridgeError::Agent("refused".into())));
        agent.expect_disconnect().times(1).returning(|| Ok(()));

        let exit = run_agent_bridge(
            &session,
            &registry,
            &AudioConfig::default(),
            &mut agent,
            Arc::new(RecordingWriter::default()),
        )
        .await;

        assert!(exit.is_none());
        assert!(!session.done().is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_agent_overload_tears_call_down() {
        let registry = SessionRegistry::new();
        let mut transport = MockPeerTransport::new();
        transport.expect_close().times(1).returning(|| Ok(()));
        let session = registry.create(Arc::new(transport));

        let audio = AudioConfig {
            bridge_capacity: 1,
            max_consecutive_drops: 2,
            ..Default::default()
        };

        let mut agent = MockVoiceAgent::new();
        agent.expect_connect().returning(|| Ok(()));
        agent.expect_initialize_audio().returning(|_, _| Ok(()));
        agent.expect_subscribe().returning(|sink| {
            // Saturate the channel before the pump runs.
            for _ in 0..3 {
                sink.offer(Bytes::from_static(&[0, 0]));
            }
            Ok(())
        });
        agent.expect_disconnect().times(1).returning(|| Ok(()));

        let exit = run_agent_bridge(
            &session,
            &registry,
            &audio,
            &mut agent,
            Arc::new(RecordingWriter::default()),
        )
        .await;

        assert_eq!(exit, Some(PumpExit::Overloaded));
        assert!(session.done().is_closed());
        assert!(registry.is_empty());
    }
}
