//! Shared fixtures: a full monitor stack wired to the scriptable in-memory
//! transport.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use relayd::chain::{Block, BlockSummary, InMemoryChainView, Slots, Transaction};
use relayd::config::{Config, PeeringConfig};
use relayd::events::PeerEventBus;
use relayd::network_type::NetworkType;
use relayd::p2p::communicator::PeerCommunicator;
use relayd::p2p::message::StatusResponse;
use relayd::p2p::monitor::NetworkMonitor;
use relayd::p2p::peer::{Peer, PeerInfo, PeerVerification, SuspendedPeer, SuspensionReason};
use relayd::p2p::processor::PeerProcessor;
use relayd::p2p::storage::PeerStorage;
use relayd::p2p::transport::{MemoryTransport, RemoteScript};

pub struct TestStack {
    pub transport: Arc<MemoryTransport>,
    pub storage: Arc<PeerStorage>,
    pub communicator: Arc<PeerCommunicator>,
    pub processor: Arc<PeerProcessor>,
    pub chain: Arc<InMemoryChainView>,
    pub events: Arc<PeerEventBus>,
    pub monitor: Arc<NetworkMonitor>,
    pub token: CancellationToken,
}

pub fn stack() -> TestStack {
    stack_with(|_| {}, Vec::new())
}

pub fn stack_with(
    tweak: impl FnOnce(&mut PeeringConfig),
    restored: Vec<PeerInfo>,
) -> TestStack {
    let mut peering = Config::default().peering;
    tweak(&mut peering);

    let transport = Arc::new(MemoryTransport::new());
    let storage = Arc::new(PeerStorage::new());
    let events = Arc::new(PeerEventBus::new());
    let chain = Arc::new(InMemoryChainView::new());
    chain.set_ready(true);

    let communicator = Arc::new(PeerCommunicator::new(
        transport.clone(),
        storage.clone(),
        peering.global_timeout_ms,
    ));
    let processor = Arc::new(PeerProcessor::new(
        storage.clone(),
        communicator.clone(),
        events.clone(),
        &peering,
        NetworkType::Testnet,
    ));

    let token = CancellationToken::new();
    let monitor = Arc::new(NetworkMonitor::new(
        peering,
        storage.clone(),
        processor.clone(),
        communicator.clone(),
        chain.clone(),
        events.clone(),
        Slots::new(0, 8),
        restored,
        token.clone(),
    ));

    TestStack {
        transport,
        storage,
        communicator,
        processor,
        chain,
        events,
        monitor,
        token,
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn status(height: u64) -> StatusResponse {
    StatusResponse {
        success: true,
        height,
        forging_allowed: true,
        current_slot: 1,
        header: Some(BlockSummary {
            id: "123456".to_string(),
            height,
        }),
        nethash: Some(NetworkType::Testnet.nethash().to_string()),
        version: None,
    }
}

/// Register a remote that answers status probes at the given height
pub fn register_responsive(stack: &TestStack, addr: IpAddr, height: u64) {
    stack.transport.register(
        addr,
        RemoteScript {
            status: Some(status(height)),
            ..Default::default()
        },
    );
}

/// Put a peer straight into the active roster, bypassing admission
pub fn seed_active_peer(stack: &TestStack, addr: IpAddr, height: u64) -> Peer {
    let mut peer = Peer::new(addr, 4009);
    peer.state.height = Some(height);
    peer.state.header = Some(BlockSummary {
        id: format!("block-{}", height),
        height,
    });
    stack.storage.set_peer(peer.clone());
    peer
}

pub fn verify_peer(stack: &TestStack, addr: IpAddr, forked: bool, common: Option<u64>) {
    stack.storage.update_peer(&addr, |p| {
        p.verification = Some(PeerVerification {
            forked,
            highest_common_height: common,
        });
    });
}

pub fn suspend_verified_peer(
    stack: &TestStack,
    addr: IpAddr,
    forked: bool,
    common: Option<u64>,
) {
    let mut peer = Peer::new(addr, 4009);
    peer.verification = Some(PeerVerification {
        forked,
        highest_common_height: common,
    });
    stack.storage.set_suspended_peer(SuspendedPeer {
        peer,
        until: i64::MAX,
        reason: SuspensionReason::BadResponse,
    });
}

pub fn genesis_block() -> Block {
    Block {
        id: "13114381566690093367".to_string(),
        height: 1,
        previous_block: None,
        timestamp: 0,
        transactions: Vec::new(),
    }
}

pub fn block_at(height: u64) -> Block {
    Block {
        id: format!("block-{}", height),
        height,
        previous_block: (height > 1).then(|| format!("block-{}", height - 1)),
        timestamp: height as i64 * 8,
        transactions: Vec::new(),
    }
}

pub fn transfer_tx() -> Transaction {
    Transaction {
        id: "bc9f9b1cbd27b1f8d8e8d9e55e96c2b1".to_string(),
        sender_public_key: "03a02b9d5fdd1307c2ee4652ba54d492d1fd11a7".to_string(),
        recipient_id: "DJLxkgm7JMortrGVh1ZrvDH39XALWLa83e".to_string(),
        amount: 200_000_000,
        fee: 10_000_000,
        signature: "3045022100e7385c6ea42bd950f7f6ab8c8619cf2f66a41d8f".to_string(),
    }
}
