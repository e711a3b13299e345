//! Pub/sub channel for peer lifecycle events.
//!
//! Other node components (metrics, RPC, the blockchain layer) subscribe to
//! learn about roster changes without polling storage.

use std::net::IpAddr;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// Peer evicted from the active roster; `reason` is the error kind that
    /// caused the eviction
    Removed { ip: IpAddr, reason: String },

    /// Peer moved to the suspended set
    Suspended { ip: IpAddr, reason: String },

    /// Peer accepted into the active roster
    Added { ip: IpAddr },
}

pub struct PeerEventBus {
    tx: broadcast::Sender<PeerEvent>,
}

impl PeerEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1_024);
        Self { tx }
    }

    /// Publish an event. Fire-and-forget: a bus without subscribers drops
    /// the event silently.
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.tx.subscribe()
    }

    #[allow(dead_code)]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PeerEventBus {
    fn default() -> Self {
        Self::new()
    }
}
