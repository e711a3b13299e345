//! Chain-side collaborators of the peer subsystem.
//!
//! The monitor never touches block storage or verification directly - it
//! reads the chain through the [`ChainView`] trait, which the blockchain
//! layer implements. The in-memory implementation here backs the daemon
//! shell and the tests.

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Id and height of a block, as peers advertise it in status replies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSummary {
    pub id: String,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub height: u64,
    #[serde(default)]
    pub previous_block: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            id: self.id.clone(),
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub sender_public_key: String,
    pub recipient_id: String,
    pub amount: u64,
    pub fee: u64,
    pub signature: String,
}

/// Transient record of how often a block has been re-observed locally.
/// Broadcast uses it to estimate the forwarding hop count and damp fan-out.
#[derive(Debug, Clone)]
pub struct BlockPing {
    pub block: BlockSummary,
    pub count: u32,
    /// First local observation, unix milliseconds
    pub first_ms: i64,
    /// Most recent local observation, unix milliseconds
    pub last_ms: i64,
}

/// Read-only view of the local chain, injected into the network monitor
#[async_trait::async_trait]
pub trait ChainView: Send + Sync {
    /// Whether the blockchain layer finished booting and accepts broadcasts
    async fn is_ready(&self) -> bool;

    async fn last_block(&self) -> Option<BlockSummary>;

    /// Ids of our most recent blocks, newest first, for common-block checks
    async fn recent_block_ids(&self) -> Vec<String>;

    async fn block_ping(&self) -> Option<BlockPing>;

    /// IP of the peer whose block caused the currently recorded fork
    async fn forked_block_source(&self) -> Option<IpAddr>;
}

/// In-memory [`ChainView`] fed by the daemon shell
pub struct InMemoryChainView {
    ready: AtomicBool,
    last_block: ArcSwapOption<BlockSummary>,
    recent_ids: RwLock<Vec<String>>,
    block_ping: RwLock<Option<BlockPing>>,
    forked_from: RwLock<Option<IpAddr>>,
}

impl InMemoryChainView {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            last_block: ArcSwapOption::from(None),
            recent_ids: RwLock::new(Vec::new()),
            block_ping: RwLock::new(None),
            forked_from: RwLock::new(None),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_last_block(&self, block: BlockSummary) {
        let mut ids = self.recent_ids.write();
        ids.insert(0, block.id.clone());
        ids.truncate(10);
        drop(ids);
        self.last_block.store(Some(Arc::new(block)));
    }

    pub fn set_block_ping(&self, ping: Option<BlockPing>) {
        *self.block_ping.write() = ping;
    }

    pub fn set_forked_block_source(&self, ip: Option<IpAddr>) {
        *self.forked_from.write() = ip;
    }
}

impl Default for InMemoryChainView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChainView for InMemoryChainView {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn last_block(&self) -> Option<BlockSummary> {
        self.last_block.load_full().map(|b| (*b).clone())
    }

    async fn recent_block_ids(&self) -> Vec<String> {
        self.recent_ids.read().clone()
    }

    async fn block_ping(&self) -> Option<BlockPing> {
        self.block_ping.read().clone()
    }

    async fn forked_block_source(&self) -> Option<IpAddr> {
        *self.forked_from.read()
    }
}

/// Slot arithmetic. A slot is one block-production window; peers in the same
/// slot are looking at the same forging opportunity.
#[derive(Debug, Clone, Copy)]
pub struct Slots {
    genesis_timestamp: i64,
    block_time_secs: i64,
}

impl Slots {
    pub fn new(genesis_timestamp: i64, block_time_secs: i64) -> Self {
        Self {
            genesis_timestamp,
            block_time_secs,
        }
    }

    pub fn slot_number(&self, unix_secs: i64) -> u64 {
        if unix_secs <= self.genesis_timestamp {
            return 0;
        }
        ((unix_secs - self.genesis_timestamp) / self.block_time_secs) as u64
    }

    pub fn current_slot(&self) -> u64 {
        self.slot_number(chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_number_counts_whole_windows() {
        let slots = Slots::new(1_000, 8);
        assert_eq!(slots.slot_number(999), 0);
        assert_eq!(slots.slot_number(1_000), 0);
        assert_eq!(slots.slot_number(1_007), 0);
        assert_eq!(slots.slot_number(1_008), 1);
        assert_eq!(slots.slot_number(1_080), 10);
    }

    #[tokio::test]
    async fn chain_view_tracks_recent_ids_newest_first() {
        let chain = InMemoryChainView::new();
        chain.set_last_block(BlockSummary {
            id: "a".into(),
            height: 1,
        });
        chain.set_last_block(BlockSummary {
            id: "b".into(),
            height: 2,
        });

        assert_eq!(chain.recent_block_ids().await, vec!["b", "a"]);
        assert_eq!(chain.last_block().await.unwrap().height, 2);
    }
}
