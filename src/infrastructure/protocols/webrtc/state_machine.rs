//! Peer state machine
//!
//! Transport callbacks only translate `webrtc` notifications into
//! [`PeerSignal`]s and queue them on the session. A single handler task per
//! session drains the queue in order and makes every lifecycle decision:
//!
//! - ICE `connected` starts outbound audio, once per session
//! - connection `failed` or `closed` tears the session down
//!
//! Everything else is logged and otherwise ignored.

use crate::domain::call::{
    CallSession, ConnectionState, IceConnectionState, PeerSignal, SessionRegistry, TeardownCause,
};
use crate::infrastructure::media::outbound::OutboundLauncher;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;

/// Route the peer connection's state callbacks into the session's queue.
///
/// Callbacks hold a weak reference: the session owns the peer connection,
/// so a strong one would keep both alive forever.
pub fn attach(pc: &RTCPeerConnection, session: &Arc<CallSession>) {
    let weak = Arc::downgrade(session);
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        forward(&weak, PeerSignal::IceConnection(state.into()));
        Box::pin(async {})
    }));

    let weak = Arc::downgrade(session);
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        forward(&weak, PeerSignal::Connection(state.into()));
        Box::pin(async {})
    }));

    let weak = Arc::downgrade(session);
    pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        forward(&weak, PeerSignal::Signaling(state.to_string()));
        Box::pin(async {})
    }));

    let weak = Arc::downgrade(session);
    pc.on_negotiation_needed(Box::new(move || {
        forward(&weak, PeerSignal::NegotiationNeeded);
        Box::pin(async {})
    }));

    let weak = Arc::downgrade(session);
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        forward(&weak, PeerSignal::IceGathering(state.to_string()));
        Box::pin(async {})
    }));
}

fn forward(session: &Weak<CallSession>, signal: PeerSignal) {
    if let Some(session) = session.upgrade() {
        session.notify(signal);
    }
}

/// Per-session transition handler
pub struct PeerStateMachine {
    session: Arc<CallSession>,
    registry: Arc<SessionRegistry>,
    outbound: Arc<dyn OutboundLauncher>,
}

impl PeerStateMachine {
    pub fn new(
        session: Arc<CallSession>,
        registry: Arc<SessionRegistry>,
        outbound: Arc<dyn OutboundLauncher>,
    ) -> Self {
        Self {
            session,
            registry,
            outbound,
        }
    }

    /// Bind the session's transition queue and start the handler task
    pub fn spawn(self) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.session.bind_signals(tx);
        tokio::spawn(self.run(rx))
    }

    async fn run(self, mut rx: UnboundedReceiver<PeerSignal>) {
        loop {
            let signal = tokio::select! {
                biased;
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
                _ = self.session.done().closed() => break,
            };
            self.handle(signal).await;
        }
        debug!(call_id = %self.session.id(), "State handler stopped");
    }

    async fn handle(&self, signal: PeerSignal) {
        let call_id = self.session.id();
        match signal {
            PeerSignal::IceConnection(IceConnectionState::Connected) => {
                info!(call_id = %call_id, "ICE connected");
                if self.session.try_mark_audio_started().await {
                    self.outbound.clone().launch(self.session.clone());
                } else {
                    debug!(call_id = %call_id, "Outbound audio already started");
                }
            }
            PeerSignal::Connection(state) if state.is_terminal() => {
                let cause = if state == ConnectionState::Failed {
                    TeardownCause::ConnectionFailed
                } else {
                    TeardownCause::ConnectionClosed
                };
                info!(call_id = %call_id, ?state, "Peer connection ended");
                self.registry.teardown(&self.session, cause).await;
            }
            other => {
                debug!(call_id = %call_id, signal = %other, "Peer state changed");
            }
        }
    }
}
