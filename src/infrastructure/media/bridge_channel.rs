//! Bridge channel
//!
//! Bounded queue of raw PCM chunks from the voice agent to the outbound
//! frame pump. The producer side never waits: a chunk offered to a full
//! channel is dropped and counted.

use crate::infrastructure::metrics;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Result of offering one chunk to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Channel full, chunk discarded
    Dropped,
    /// Chunk discarded and the consecutive-drop threshold was just crossed
    Overloaded,
    /// Consumer is gone
    Closed,
}

/// Counters shared by both ends of a bridge channel
#[derive(Debug, Default)]
pub struct BridgeStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    consecutive_drops: AtomicU32,
    overloaded: AtomicBool,
    max_consecutive_drops: u32,
}

impl BridgeStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn consecutive_drops(&self) -> u32 {
        self.consecutive_drops.load(Ordering::Relaxed)
    }

    pub fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Acquire)
    }
}

/// Create a bridge channel holding at most `capacity` chunks.
///
/// `max_consecutive_drops` of zero disables overload escalation.
pub fn bridge_channel(capacity: usize, max_consecutive_drops: u32) -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(BridgeStats {
        max_consecutive_drops,
        ..Default::default()
    });

    (
        BridgeSender {
            tx,
            stats: stats.clone(),
        },
        BridgeReceiver { rx, stats },
    )
}

/// Producer end, handed to the voice agent
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::Sender<Bytes>,
    stats: Arc<BridgeStats>,
}

impl BridgeSender {
    /// Offer a chunk without waiting
    pub fn offer(&self, chunk: Bytes) -> SendOutcome {
        match self.tx.try_send(chunk) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                self.stats.consecutive_drops.store(0, Ordering::Relaxed);
                SendOutcome::Sent
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_chunk_dropped();

                let consecutive = self.stats.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
                let threshold = self.stats.max_consecutive_drops;
                if threshold > 0
                    && consecutive >= threshold
                    && !self.stats.overloaded.swap(true, Ordering::AcqRel)
                {
                    warn!(consecutive, "Bridge channel overloaded");
                    return SendOutcome::Overloaded;
                }
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }
}

/// Consumer end, owned by the outbound frame pump
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::Receiver<Bytes>,
    stats: Arc<BridgeStats>,
}

impl BridgeReceiver {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Stop accepting chunks. Buffered chunks can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn is_overloaded(&self) -> bool {
        self.stats.is_overloaded()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_newest() {
        let (tx, mut rx) = bridge_channel(2, 0);

        assert_eq!(tx.offer(Bytes::from_static(b"a")), SendOutcome::Sent);
        assert_eq!(tx.offer(Bytes::from_static(b"b")), SendOutcome::Sent);
        assert_eq!(tx.offer(Bytes::from_static(b"c")), SendOutcome::Dropped);
        assert_eq!(tx.offer(Bytes::from_static(b"d")), SendOutcome::Dropped);

        assert_eq!(tx.stats().dropped(), 2);
        assert_eq!(tx.stats().sent(), 2);
        assert!(!rx.is_overloaded());

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn test_producer_never_blocks_when_saturated() {
        let (tx, _rx) = bridge_channel(1, 0);
        let producer = tokio::spawn(async move {
            for _ in 0..1000 {
                tx.offer(Bytes::from_static(&[0, 0]));
            }
            tx.stats().dropped()
        });

        let dropped = tokio::time::timeout(std::time::Duration::from_secs(1), producer)
            .await
            .expect("producer must not block")
            .unwrap();
        assert_eq!(dropped, 999);
    }

    #[tokio::test]
    async fn test_overload_reported_once_at_threshold() {
        let (tx, mut rx) = bridge_channel(1, 3);
        tx.offer(Bytes::new());

        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Dropped);
        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Dropped);
        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Overloaded);
        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Dropped);
        assert!(rx.is_overloaded());

        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_send_resets_consecutive_drops() {
        let (tx, mut rx) = bridge_channel(1, 3);
        tx.offer(Bytes::new());
        tx.offer(Bytes::new());
        tx.offer(Bytes::new());
        assert_eq!(tx.stats().consecutive_drops(), 2);

        rx.recv().await.unwrap();
        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Sent);
        assert_eq!(tx.stats().consecutive_drops(), 0);
        assert!(!rx.is_overloaded());
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (tx, mut rx) = bridge_channel(4, 0);
        rx.close();
        assert_eq!(tx.offer(Bytes::new()), SendOutcome::Closed);
        assert!(tx.is_closed());
        assert!(rx.recv().await.is_none());
    }
}
