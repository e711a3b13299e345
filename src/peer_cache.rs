//! Cached-peer snapshot.
//!
//! The monitor reads the previous run's responsive peers at startup so a
//! restart does not depend on seeds alone; the daemon rewrites the snapshot
//! on shutdown. Nothing else in the peer subsystem touches disk.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::info;

use crate::error::AppError;

const PEERS_TREE: &str = "peers";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPeer {
    pub ip: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub version: Option<String>,
}

pub struct PeerCache {
    db: sled::Db,
}

impl PeerCache {
    pub fn open(path: &str) -> Result<Self, AppError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Throwaway database for tests
    #[allow(dead_code)]
    pub fn temporary() -> Result<Self, AppError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Load every cached peer, skipping records that no longer decode
    pub fn load(&self) -> Result<Vec<CachedPeer>, AppError> {
        let tree = self.db.open_tree(PEERS_TREE)?;
        let mut peers = Vec::new();
        for entry in tree.iter().flatten() {
            let (_, value) = entry;
            if let Ok(peer) = bincode::deserialize::<CachedPeer>(&value) {
                peers.push(peer);
            }
        }
        if !peers.is_empty() {
            info!("✓ Restored {} cached peer(s)", peers.len());
        }
        Ok(peers)
    }

    /// Replace the snapshot with the given peer list
    pub fn store(&self, peers: &[CachedPeer]) -> Result<(), AppError> {
        let tree = self.db.open_tree(PEERS_TREE)?;
        tree.clear()?;
        for peer in peers {
            let key = peer.ip.to_string();
            let value = bincode::serialize(peer)?;
            tree.insert(key.as_bytes(), value)?;
        }
        self.db.flush()?;
        Ok(())
    }
}
