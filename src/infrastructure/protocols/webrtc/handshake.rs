//! Negotiation handshake
//!
//! Answers one client offer:
//!
//! ```text
//! ReceivedOffer -> TransportCreated -> TransceiverConfigured
//!   -> LocalCandidatesGathering -> RemoteDescriptionApplied
//!   -> RemoteCandidatesApplied -> AnswerCreated -> LocalDescriptionApplied
//!   -> GatheringComplete -> ResponseSent
//! ```
//!
//! Any failure moves the call to `Rejected`. Once the session is registered
//! a rejection also tears it down, so a failed handshake never leaves a
//! reachable session behind.

use super::state_machine::{self, PeerStateMachine};
use super::transport::{PeerFactory, RtcTransport};
use crate::config::{AudioConfig, Config, OutboundConfig};
use crate::domain::call::{CallSession, SessionRegistry, TeardownCause};
use crate::domain::shared::{BridgeError, CallId, Result};
use crate::infrastructure::agent::VoiceAgentFactory;
use crate::infrastructure::media::outbound::OutboundAudio;
use crate::infrastructure::media::recorder::InboundRecorder;
use crate::infrastructure::media::track::new_opus_track;
use crate::infrastructure::metrics;
use crate::infrastructure::signaling::{decode, encode, join_envelopes, split_body};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;

/// Progress of one handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    ReceivedOffer,
    TransportCreated,
    TransceiverConfigured,
    LocalCandidatesGathering,
    RemoteDescriptionApplied,
    RemoteCandidatesApplied,
    AnswerCreated,
    LocalDescriptionApplied,
    GatheringComplete,
    ResponseSent,
    Rejected,
}

impl HandshakeStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeStage::ResponseSent | HandshakeStage::Rejected)
    }
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A successfully answered call
#[derive(Debug, Clone)]
pub struct NegotiatedCall {
    pub call_id: CallId,
    /// `<answer envelope>;<local candidates envelope>`
    pub body: String,
}

/// Per-call handshake tracker, used for stage logging
struct Handshake {
    call_id: Option<CallId>,
    stage: HandshakeStage,
}

impl Handshake {
    fn new() -> Self {
        Self {
            call_id: None,
            stage: HandshakeStage::ReceivedOffer,
        }
    }

    fn advance(&mut self, stage: HandshakeStage) {
        debug!(
            call_id = self.call_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            from = %self.stage,
            to = %stage,
            "Handshake stage"
        );
        self.stage = stage;
    }

    fn reject(&mut self, err: &BridgeError) {
        warn!(
            call_id = self.call_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            stage = %self.stage,
            error = %err,
            "Handshake rejected"
        );
        self.stage = HandshakeStage::Rejected;
    }
}

/// Answerer side of the offer/answer exchange
pub struct Negotiator {
    factory: PeerFactory,
    registry: Arc<SessionRegistry>,
    recorder: Arc<InboundRecorder>,
    agents: Option<Arc<dyn VoiceAgentFactory>>,
    audio: AudioConfig,
    outbound: OutboundConfig,
    gather_timeout: Duration,
}

impl Negotiator {
    pub fn new(
        config: &Config,
        registry: Arc<SessionRegistry>,
        agents: Option<Arc<dyn VoiceAgentFactory>>,
    ) -> Result<Self> {
        let recorder = Arc::new(InboundRecorder::new(
            config.recording.clone(),
            config.call.idle_hangup(),
            registry.clone(),
        ));

        Ok(Self {
            factory: PeerFactory::new(&config.webrtc)?,
            registry,
            recorder,
            agents,
            audio: config.audio.clone(),
            outbound: config.outbound.clone(),
            gather_timeout: config.webrtc.gather_timeout(),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Answer `<offer envelope>;<candidates envelope>`
    pub async fn negotiate(&self, body: &str) -> Result<NegotiatedCall> {
        let mut handshake = Handshake::new();

        let (offer, candidates) = match parse_request(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                handshake.reject(&e);
                metrics::record_call_rejected(e.kind());
                return Err(e);
            }
        };

        let pc = match self.factory.create().await {
            Ok(pc) => pc,
            Err(e) => {
                handshake.reject(&e);
                metrics::record_call_rejected(e.kind());
                return Err(e);
            }
        };

        let session = self.registry.create(Arc::new(RtcTransport::new(pc.clone())));
        handshake.call_id = Some(session.id().clone());
        handshake.advance(HandshakeStage::TransportCreated);

        match self.drive(&mut handshake, &session, &pc, offer, candidates).await {
            Ok(body) => {
                handshake.advance(HandshakeStage::ResponseSent);
                metrics::record_call_negotiated();
                info!(call_id = %session.id(), "Call negotiated");
                Ok(NegotiatedCall {
                    call_id: session.id().clone(),
                    body,
                })
            }
            Err(e) => {
                handshake.reject(&e);
                metrics::record_call_rejected(e.kind());
                self.registry.teardown(&session, TeardownCause::HandshakeFailed).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        handshake: &mut Handshake,
        session: &Arc<CallSession>,
        pc: &Arc<RTCPeerConnection>,
        offer: RTCSessionDescription,
        remote_candidates: Vec<RTCIceCandidateInit>,
    ) -> Result<String> {
        let call_id = session.id().clone();

        // State handling is in place before anything can change state.
        let outbound = Arc::new(OutboundAudio::new(
            self.audio.clone(),
            self.outbound.clone(),
            self.registry.clone(),
            self.agents.clone(),
        ));
        PeerStateMachine::new(session.clone(), self.registry.clone(), outbound.clone()).spawn();
        state_machine::attach(pc, session);

        let direction = if self.outbound.sends_audio() {
            RTCRtpTransceiverDirection::Sendrecv
        } else {
            RTCRtpTransceiverDirection::Recvonly
        };
        let transceiver = pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| BridgeError::Transport(format!("add transceiver: {}", e)))?;

        if self.outbound.sends_audio() {
            let track = new_opus_track(&call_id, self.audio.sample_rate, self.audio.channels);
            let sender = transceiver.sender().await;
            sender
                .replace_track(Some(track as Arc<dyn TrackLocal + Send + Sync>))
                .await
                .map_err(|e| BridgeError::Transport(format!("attach outbound track: {}", e)))?;
            tokio::spawn(drain_rtcp(sender));
        }
        outbound.bind_transceiver(transceiver);
        handshake.advance(HandshakeStage::TransceiverConfigured);

        let gathered: Arc<Mutex<Vec<RTCIceCandidateInit>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let gathered = gathered.clone();
            let call_id = call_id.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let gathered = gathered.clone();
                let call_id = call_id.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        debug!(call_id = %call_id, "Local candidate gathering finished");
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => gathered.lock().await.push(init),
                        Err(e) => warn!(call_id = %call_id, error = %e, "Unserializable local candidate"),
                    }
                })
            }));
        }
        handshake.advance(HandshakeStage::LocalCandidatesGathering);

        {
            let recorder = self.recorder.clone();
            let weak = Arc::downgrade(session);
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                if let Some(session) = weak.upgrade() {
                    recorder.on_track(session, track);
                }
                Box::pin(async {})
            }));
        }

        pc.set_remote_description(offer)
            .await
            .map_err(|e| BridgeError::Negotiation(format!("set remote description: {}", e)))?;
        handshake.advance(HandshakeStage::RemoteDescriptionApplied);

        for (index, candidate) in remote_candidates.into_iter().enumerate() {
            pc.add_ice_candidate(candidate)
                .await
                .map_err(|e| BridgeError::Negotiation(format!("remote candidate {}: {}", index, e)))?;
        }
        handshake.advance(HandshakeStage::RemoteCandidatesApplied);

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| BridgeError::Negotiation(format!("create answer: {}", e)))?;
        handshake.advance(HandshakeStage::AnswerCreated);

        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(answer)
            .await
            .map_err(|e| BridgeError::Negotiation(format!("set local description: {}", e)))?;
        handshake.advance(HandshakeStage::LocalDescriptionApplied);

        if self.gather_timeout.is_zero() {
            let _ = gather_complete.recv().await;
        } else if tokio::time::timeout(self.gather_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(
                call_id = %call_id,
                timeout_secs = self.gather_timeout.as_secs(),
                "Candidate gathering timed out, answering with candidates found so far"
            );
        }
        handshake.advance(HandshakeStage::GatheringComplete);

        if session.done().is_closed() {
            return Err(BridgeError::Negotiation(
                "peer connection ended during negotiation".into(),
            ));
        }

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| BridgeError::Negotiation("no local description".into()))?;
        let local_candidates = gathered.lock().await.clone();
        debug!(call_id = %call_id, candidates = local_candidates.len(), "Local candidates gathered");

        Ok(join_envelopes(&encode(&local), &encode(&local_candidates)))
    }
}

/// Split and decode `<offer envelope>;<candidates envelope>`
pub fn parse_request(body: &str) -> Result<(RTCSessionDescription, Vec<RTCIceCandidateInit>)> {
    let (offer, candidates) = split_body(body)?;
    let offer: RTCSessionDescription = decode(offer)?;
    let candidates: Vec<RTCIceCandidateInit> = decode(candidates)?;
    Ok((offer, candidates))
}

/// Read RTCP for the sender so its interceptors never stall
async fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    let mut buf = vec![0u8; 1500];
    while sender.read(&mut buf).await.is_ok() {}
}
