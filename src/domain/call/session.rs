//! Call session

use super::signal::{CompletionSignal, PeerSignal};
use super::transport::PeerTransport;
use crate::domain::shared::CallId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownCause {
    /// Explicit termination request
    Hangup,
    ConnectionFailed,
    ConnectionClosed,
    /// No inbound audio within the idle threshold
    IdleTimeout,
    /// Outbound file playback hit its timeout with close-on-timeout set
    PlaybackTimeout,
    /// The bridge channel crossed the consecutive-drop threshold
    BridgeOverload,
    /// The negotiation handshake failed after the session was registered
    HandshakeFailed,
    Shutdown,
}

impl TeardownCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownCause::Hangup => "hangup",
            TeardownCause::ConnectionFailed => "connection_failed",
            TeardownCause::ConnectionClosed => "connection_closed",
            TeardownCause::IdleTimeout => "idle_timeout",
            TeardownCause::PlaybackTimeout => "playback_timeout",
            TeardownCause::BridgeOverload => "bridge_overload",
            TeardownCause::HandshakeFailed => "handshake_failed",
            TeardownCause::Shutdown => "shutdown",
        }
    }
}

/// One active call.
///
/// The session exclusively owns its transport handle. Mutable state is
/// guarded per field; nothing here takes a lock shared with other calls.
pub struct CallSession {
    id: CallId,
    transport: Arc<dyn PeerTransport>,
    audio_started: Mutex<bool>,
    done: CompletionSignal,
    idle_timers: StdMutex<Vec<AbortHandle>>,
    signals: OnceLock<UnboundedSender<PeerSignal>>,
    created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: CallId, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            id,
            transport,
            audio_started: Mutex::new(false),
            done: CompletionSignal::new(),
            idle_timers: StdMutex::new(Vec::new()),
            signals: OnceLock::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn done(&self) -> &CompletionSignal {
        &self.done
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Flip the outbound-started flag. Returns `true` for the first caller only.
    pub async fn try_mark_audio_started(&self) -> bool {
        let mut started = self.audio_started.lock().await;
        if *started {
            return false;
        }
        *started = true;
        true
    }

    pub async fn audio_started(&self) -> bool {
        *self.audio_started.lock().await
    }

    /// Track an idle timer so teardown can cancel it.
    ///
    /// A timer registered after teardown is aborted immediately.
    pub fn register_idle_timer(&self, handle: AbortHandle) {
        if self.done.is_closed() {
            handle.abort();
            return;
        }
        self.idle_timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Abort every registered idle timer
    pub fn cancel_idle_timers(&self) {
        let timers = std::mem::take(
            &mut *self
                .idle_timers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for timer in timers {
            timer.abort();
        }
    }

    /// Bind the transition queue. Only the first binding takes effect.
    pub fn bind_signals(&self, tx: UnboundedSender<PeerSignal>) -> bool {
        self.signals.set(tx).is_ok()
    }

    /// Deliver a transport transition to the session's transition handler.
    ///
    /// Transitions arriving before a handler is bound, or after it has
    /// stopped, are discarded.
    pub fn notify(&self, signal: PeerSignal) -> bool {
        match self.signals.get() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("closed", &self.done.is_closed())
            .field("created_at", &self.created_at)
            .finish()
    }
}
