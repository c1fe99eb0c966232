//! Peer transport seam

use crate::domain::shared::Result;
use async_trait::async_trait;

/// The peer media transport owned by a single call session.
///
/// Only the operations the session lifecycle needs are exposed here; the
/// negotiation handshake talks to the concrete transport directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Close the transport and release its network resources
    async fn close(&self) -> Result<()>;
}
