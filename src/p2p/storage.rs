//! In-memory peer registry.
//!
//! The only shared mutable state of the peer subsystem. Backed by DashMap
//! so probes, discovery and broadcasts can hit it concurrently; iteration
//! always returns cloned snapshots so callers may mutate while others read.
//!
//! Invariant: a peer is in the active set XOR the suspended set, never both.

use dashmap::DashMap;
use std::net::IpAddr;

use super::peer::{Peer, SuspendedPeer};

pub struct PeerStorage {
    peers: DashMap<IpAddr, Peer>,
    suspended: DashMap<IpAddr, SuspendedPeer>,
}

impl PeerStorage {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            suspended: DashMap::new(),
        }
    }

    /// Insert or replace an active peer. Clears any suspension for the same
    /// IP to uphold the active-XOR-suspended invariant.
    pub fn set_peer(&self, peer: Peer) {
        self.suspended.remove(&peer.ip);
        self.peers.insert(peer.ip, peer);
    }

    pub fn get_peer(&self, ip: &IpAddr) -> Option<Peer> {
        self.peers.get(ip).map(|p| p.value().clone())
    }

    pub fn has_peer(&self, ip: &IpAddr) -> bool {
        self.peers.contains_key(ip)
    }

    /// Idempotent: forgetting an unknown peer is a no-op
    pub fn forget_peer(&self, ip: &IpAddr) {
        self.peers.remove(ip);
    }

    /// Snapshot of the active roster
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    /// Apply a mutation to an active peer in place. Returns false when the
    /// peer is not in the active set.
    pub fn update_peer<F>(&self, ip: &IpAddr, mutate: F) -> bool
    where
        F: FnOnce(&mut Peer),
    {
        match self.peers.get_mut(ip) {
            Some(mut entry) => {
                mutate(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Park a peer. Removes it from the active set first.
    pub fn set_suspended_peer(&self, suspended: SuspendedPeer) {
        self.peers.remove(&suspended.peer.ip);
        self.suspended.insert(suspended.peer.ip, suspended);
    }

    pub fn get_suspended_peer(&self, ip: &IpAddr) -> Option<SuspendedPeer> {
        self.suspended.get(ip).map(|p| p.value().clone())
    }

    pub fn has_suspended_peer(&self, ip: &IpAddr) -> bool {
        self.suspended.contains_key(ip)
    }

    pub fn suspended_peers(&self) -> Vec<SuspendedPeer> {
        self.suspended
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn forget_suspended_peer(&self, ip: &IpAddr) {
        self.suspended.remove(ip);
    }
}

impl Default for PeerStorage {
    fn default() -> Self {
        Self::new()
    }
}
