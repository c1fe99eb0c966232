//! Session registry
//!
//! A concurrent map from call identifier to session. Lookups and mutations
//! lock a single shard of the map, never the whole call set, and each
//! session guards its own mutable fields.

use super::session::{CallSession, TeardownCause};
use super::transport::PeerTransport;
use crate::domain::shared::{BridgeError, CallId, Result};
use crate::infrastructure::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of active call sessions
pub struct SessionRegistry {
    sessions: DashMap<CallId, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new session bound to `transport` under a fresh identifier
    pub fn create(&self, transport: Arc<dyn PeerTransport>) -> Arc<CallSession> {
        self.create_with(transport, CallId::generate)
    }

    fn create_with<F>(&self, transport: Arc<dyn PeerTransport>, mut next_id: F) -> Arc<CallSession>
    where
        F: FnMut() -> CallId,
    {
        let session = loop {
            let id = next_id();
            match self.sessions.entry(id) {
                Entry::Occupied(occupied) => {
                    warn!(call_id = %occupied.key(), "Call id collision, regenerating");
                }
                Entry::Vacant(vacant) => {
                    let session = Arc::new(CallSession::new(vacant.key().clone(), transport.clone()));
                    vacant.insert(session.clone());
                    break session;
                }
            }
        };

        // The entry guard is released above; `len` touches every shard.
        metrics::update_active_calls(self.sessions.len());
        session
    }

    pub fn lookup(&self, id: &CallId) -> Result<Arc<CallSession>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))
    }

    /// Remove the mapping. Absent identifiers are a no-op.
    pub fn remove(&self, id: &CallId) -> Option<Arc<CallSession>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            metrics::update_active_calls(self.sessions.len());
        }
        removed
    }

    /// Weakly consistent snapshot of registered identifiers
    pub fn list(&self) -> Vec<CallId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tear a session down.
    ///
    /// Closes the completion signal, unregisters the session, cancels its
    /// idle timers and finally closes the transport. Only the first caller
    /// does any of this; later calls return `false` without side effects.
    pub async fn teardown(&self, session: &CallSession, cause: TeardownCause) -> bool {
        if !session.done().close() {
            return false;
        }

        self.remove(session.id());
        session.cancel_idle_timers();

        if let Err(e) = session.transport().close().await {
            warn!(call_id = %session.id(), error = %e, "Failed to close peer transport");
        }

        metrics::record_call_terminated(cause.as_str());
        info!(call_id = %session.id(), cause = cause.as_str(), "Call torn down");
        true
    }

    /// Tear down the session registered under `id`
    pub async fn terminate(&self, id: &CallId, cause: TeardownCause) -> Result<()> {
        let session = self.lookup(id)?;
        self.teardown(&session, cause).await;
        Ok(())
    }

    /// Tear down every registered session
    pub async fn terminate_all(&self, cause: TeardownCause) -> usize {
        let sessions: Vec<Arc<CallSession>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut closed = 0;
        for session in sessions {
            if self.teardown(&session, cause).await {
                closed += 1;
            }
        }
        closed
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
