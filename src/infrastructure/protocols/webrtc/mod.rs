//! WebRTC peer transport: connection setup, the answerer handshake and the
//! per-session state machine

pub mod handshake;
pub mod state_machine;
pub mod transport;

pub use handshake::{parse_request, HandshakeStage, NegotiatedCall, Negotiator};
pub use state_machine::PeerStateMachine;
pub use transport::{build_api, rtc_configuration, PeerFactory, RtcTransport};
