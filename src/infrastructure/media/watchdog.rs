//! Idle watchdog
//!
//! Hangs a call up when no inbound audio arrives for a configured period.
//! Every received packet kicks the watchdog and restarts the period.
//! Dropping the watchdog disarms it, so a track that ends normally never
//! hangs the call up.

use crate::domain::call::{CallSession, SessionRegistry, TeardownCause};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::info;

pub struct IdleWatchdog {
    kick: Arc<Notify>,
    task: AbortHandle,
}

impl IdleWatchdog {
    /// Start watching `session`. A zero threshold disables the watchdog.
    pub fn arm(threshold: Duration, session: Arc<CallSession>, registry: Arc<SessionRegistry>) -> Option<Self> {
        if threshold.is_zero() {
            return None;
        }

        let kick = Arc::new(Notify::new());
        let task = {
            let kick = kick.clone();
            let session = session.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = kick.notified() => continue,
                        _ = tokio::time::sleep(threshold) => break,
                    }
                }

                info!(
                    call_id = %session.id(),
                    idle_secs = threshold.as_secs_f64(),
                    "No inbound audio, hanging up"
                );
                // Teardown aborts this task through the session's timer list,
                // so it has to run on its own task.
                tokio::spawn(async move {
                    registry.teardown(&session, TeardownCause::IdleTimeout).await;
                });
            })
        };

        let handle = task.abort_handle();
        session.register_idle_timer(handle.clone());
        Some(Self { kick, task: handle })
    }

    /// Record inbound activity
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}
