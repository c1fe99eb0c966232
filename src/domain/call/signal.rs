//! Transport transitions and the per-session completion signal

use std::fmt;
use tokio::sync::watch;

/// ICE-level connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
    Unknown,
}

/// Overall peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
    Unknown,
}

impl ConnectionState {
    /// Failed and closed are the only states that end a call
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// A named transition reported by the peer transport.
///
/// Transport callbacks never act on the session themselves; they enqueue one
/// of these and the session's transition handler processes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignal {
    IceConnection(IceConnectionState),
    Connection(ConnectionState),
    Signaling(String),
    NegotiationNeeded,
    IceGathering(String),
}

impl fmt::Display for PeerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerSignal::IceConnection(state) => write!(f, "ice_connection={:?}", state),
            PeerSignal::Connection(state) => write!(f, "connection={:?}", state),
            PeerSignal::Signaling(state) => write!(f, "signaling={}", state),
            PeerSignal::NegotiationNeeded => write!(f, "negotiation_needed"),
            PeerSignal::IceGathering(state) => write!(f, "ice_gathering={}", state),
        }
    }
}

/// Broadcast completion flag, closed at most once.
///
/// Every per-session task holds a receiver and selects on [`closed`](Self::closed)
/// so teardown is observed at the next await point.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Close the signal. Returns `true` only for the caller that actually closed it.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is closed
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a dropped channel.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
