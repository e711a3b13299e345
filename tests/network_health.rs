//! Fork detection via majority consensus over verified peer state.

mod common;

use common::*;
use relayd::chain::BlockSummary;

fn chain_at(stack: &TestStack, height: u64) {
    stack.chain.set_last_block(BlockSummary {
        id: format!("tip-{}", height),
        height,
    });
}

#[tokio::test]
async fn empty_roster_reports_healthy() {
    let stack = stack();
    chain_at(&stack, 110);

    let status = stack.monitor.check_network_health().await;
    assert!(!status.forked);
    assert_eq!(status.blocks_to_rollback, None);
}

#[tokio::test]
async fn minority_of_forked_peers_reports_healthy() {
    let stack = stack();
    chain_at(&stack, 110);

    // 10 peers, 3 of them forked: we are the majority
    for i in 1..=10u8 {
        let addr = ip(&format!("10.0.0.{}", i));
        register_responsive(&stack, addr, 110);
        seed_active_peer(&stack, addr, 110);
        verify_peer(&stack, addr, i <= 3, Some(if i <= 3 { 100 } else { 110 }));
    }

    let status = stack.monitor.check_network_health().await;
    assert!(!status.forked);
}

#[tokio::test]
async fn forked_majority_recommends_rollback_to_largest_group() {
    let stack = stack();
    chain_at(&stack, 110);

    // 8 peers agree with us up to height 100, 2 only up to 95; 7 forked
    for i in 1..=10u8 {
        let addr = ip(&format!("10.0.0.{}", i));
        register_responsive(&stack, addr, 110);
        seed_active_peer(&stack, addr, 110);
        let common = if i <= 8 { 100 } else { 95 };
        let forked = i <= 5 || i > 8;
        verify_peer(&stack, addr, forked, Some(common));
    }

    let status = stack.monitor.check_network_health().await;
    assert!(status.forked);
    assert_eq!(status.blocks_to_rollback, Some(10));
}

#[tokio::test]
async fn group_size_ties_break_toward_highest_common_height() {
    let stack = stack();
    chain_at(&stack, 110);

    // Two groups of 5; the group at height 100 must win over the one at 95
    for i in 1..=10u8 {
        let addr = ip(&format!("10.0.0.{}", i));
        register_responsive(&stack, addr, 110);
        seed_active_peer(&stack, addr, 110);
        let common = if i <= 5 { 95 } else { 100 };
        verify_peer(&stack, addr, true, Some(common));
    }

    let status = stack.monitor.check_network_health().await;
    assert!(status.forked);
    assert_eq!(status.blocks_to_rollback, Some(10));
}

#[tokio::test]
async fn exactly_half_forked_counts_as_forked() {
    let stack = stack();
    chain_at(&stack, 110);

    let a = ip("10.0.0.1");
    let b = ip("10.0.0.2");
    for addr in [a, b] {
        register_responsive(&stack, addr, 110);
        seed_active_peer(&stack, addr, 110);
    }
    verify_peer(&stack, a, true, Some(100));
    verify_peer(&stack, b, false, Some(100));

    let status = stack.monitor.check_network_health().await;
    assert!(status.forked);
    assert_eq!(status.blocks_to_rollback, Some(10));
}

#[tokio::test]
async fn verified_suspended_peers_join_the_vote() {
    let stack = stack();
    chain_at(&stack, 110);

    // One healthy active peer, two verified forked suspects: 2/3 forked
    let active = ip("10.0.0.1");
    register_responsive(&stack, active, 110);
    seed_active_peer(&stack, active, 110);
    verify_peer(&stack, active, false, Some(110));

    suspend_verified_peer(&stack, ip("10.0.0.2"), true, Some(104));
    suspend_verified_peer(&stack, ip("10.0.0.3"), true, Some(104));

    let status = stack.monitor.check_network_health().await;
    assert!(status.forked);
    assert_eq!(status.blocks_to_rollback, Some(6));
}

#[tokio::test]
async fn unverified_suspended_peers_do_not_vote() {
    let stack = stack();
    chain_at(&stack, 110);

    // The only voter is the healthy active peer; the unverified suspect is
    // excluded, so the network looks healthy
    let active = ip("10.0.0.1");
    register_responsive(&stack, active, 110);
    seed_active_peer(&stack, active, 110);
    verify_peer(&stack, active, false, Some(110));

    let mut unverified = relayd::p2p::peer::Peer::new(ip("10.0.0.2"), 4009);
    unverified.verification = None;
    stack
        .storage
        .set_suspended_peer(relayd::p2p::peer::SuspendedPeer {
            peer: unverified,
            until: i64::MAX,
            reason: relayd::p2p::peer::SuspensionReason::Unresponsive,
        });

    let status = stack.monitor.check_network_health().await;
    assert!(!status.forked);
}

#[tokio::test]
async fn health_check_verifies_peers_through_common_blocks() {
    let stack = stack();

    // The peer shares our block at height 100 but not our tip: forked
    let addr = ip("10.0.0.1");
    let shared = BlockSummary {
        id: "shared-100".to_string(),
        height: 100,
    };
    stack.chain.set_last_block(shared.clone());
    chain_at(&stack, 110); // tip above the shared block

    stack.transport.register(
        addr,
        relayd::p2p::transport::RemoteScript {
            status: Some(status(120)),
            common: Some(shared),
            ..Default::default()
        },
    );
    seed_active_peer(&stack, addr, 120);

    let network_status = stack.monitor.check_network_health().await;

    let peer = stack.storage.get_peer(&addr).unwrap();
    let verification = peer.verification.expect("peer should be verified now");
    assert!(verification.forked);
    assert_eq!(verification.highest_common_height, Some(100));
    assert!(network_status.forked);
    assert_eq!(network_status.blocks_to_rollback, Some(10));
}
