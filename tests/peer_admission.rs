//! Admission control: who gets into the roster, who gets parked, and for
//! which reason.

mod common;

use common::*;
use relayd::error::AppError;
use relayd::p2p::error::AdmissionError;
use relayd::p2p::peer::{PeerInfo, SuspensionReason};
use relayd::p2p::processor::AcceptOptions;
use relayd::p2p::transport::{endpoints, RemoteScript, ScriptedFailure};

#[tokio::test]
async fn seed_peer_with_matching_nethash_is_accepted() {
    let stack = stack();
    let seed = ip("127.0.0.1");
    register_responsive(&stack, seed, 1);

    stack.monitor.populate_seed_peers().await.unwrap();

    let peer = stack.storage.get_peer(&seed).expect("seed should be active");
    assert_eq!(peer.port, 4009);
    assert_eq!(peer.state.height, Some(1));
    assert!(peer.last_pinged.is_some());
}

#[tokio::test]
async fn empty_seed_list_is_fatal() {
    let stack = stack_with(|cfg| cfg.seeds.clear(), Vec::new());

    let err = stack.monitor.populate_seed_peers().await.unwrap_err();
    assert!(matches!(err, AppError::NoSeedsConfigured));
}

#[tokio::test]
async fn restored_peers_are_seeded_alongside_configured_seeds() {
    let restored = PeerInfo::new(ip("10.0.0.50"), 4009);
    let stack = stack_with(|_| {}, vec![restored]);
    register_responsive(&stack, ip("127.0.0.1"), 1);
    register_responsive(&stack, ip("10.0.0.50"), 5);

    stack.monitor.populate_seed_peers().await.unwrap();

    assert!(stack.storage.has_peer(&ip("127.0.0.1")));
    assert!(stack.storage.has_peer(&ip("10.0.0.50")));
}

#[tokio::test]
async fn blacklisted_candidate_is_suspended() {
    let stack = stack_with(
        |cfg| cfg.blacklist = vec!["10.0.0.66".to_string()],
        Vec::new(),
    );
    let banned = ip("10.0.0.66");
    register_responsive(&stack, banned, 1);

    let err = stack
        .processor
        .validate_and_accept_peer(PeerInfo::new(banned, 4009), AcceptOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AdmissionError::Blacklisted(_)));
    assert!(!stack.storage.has_peer(&banned));
    let suspended = stack.storage.get_suspended_peer(&banned).unwrap();
    assert_eq!(suspended.reason, SuspensionReason::Blacklisted);
}

#[tokio::test]
async fn candidate_below_minimum_version_is_suspended() {
    let stack = stack();
    let old = ip("10.0.0.7");
    register_responsive(&stack, old, 1);

    let mut candidate = PeerInfo::new(old, 4009);
    candidate.version = Some("0.1.9".to_string());

    let err = stack
        .processor
        .validate_and_accept_peer(candidate, AcceptOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AdmissionError::VersionMismatch { .. }));
    assert_eq!(
        stack.storage.get_suspended_peer(&old).unwrap().reason,
        SuspensionReason::InvalidVersion
    );
    // The candidate never earned a probe
    assert_eq!(stack.transport.calls(old, endpoints::GET_STATUS), 0);
}

#[tokio::test]
async fn candidate_on_another_chain_is_suspended() {
    let stack = stack();
    let stranger = ip("10.0.0.8");
    let mut wrong_chain = status(1);
    wrong_chain.nethash = Some("ffffffffffffffff".to_string());
    stack.transport.register(
        stranger,
        RemoteScript {
            status: Some(wrong_chain),
            ..Default::default()
        },
    );

    let err = stack
        .processor
        .validate_and_accept_peer(PeerInfo::new(stranger, 4009), AcceptOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AdmissionError::NethashMismatch { .. }));
    assert_eq!(
        stack.storage.get_suspended_peer(&stranger).unwrap().reason,
        SuspensionReason::NethashMismatch
    );
    assert!(!stack.storage.has_peer(&stranger));
}

#[tokio::test]
async fn unreachable_candidate_is_suspended_as_unresponsive() {
    let stack = stack();
    let dead = ip("10.0.0.9");
    // Not registered with the transport: connection refused

    let err = stack
        .processor
        .validate_and_accept_peer(PeerInfo::new(dead, 4009), AcceptOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AdmissionError::Unreachable { .. }));
    assert_eq!(
        stack.storage.get_suspended_peer(&dead).unwrap().reason,
        SuspensionReason::Unresponsive
    );
}

#[tokio::test]
async fn accepting_the_same_peer_twice_is_idempotent() {
    let stack = stack();
    let addr = ip("10.0.0.10");
    register_responsive(&stack, addr, 3);

    let candidate = PeerInfo::new(addr, 4009);
    stack
        .processor
        .validate_and_accept_peer(candidate.clone(), AcceptOptions::default())
        .await
        .unwrap();
    let first_snapshot = stack.storage.get_peer(&addr).unwrap();

    stack
        .processor
        .validate_and_accept_peer(candidate, AcceptOptions::default())
        .await
        .unwrap();

    assert_eq!(stack.storage.count(), 1);
    let second_snapshot = stack.storage.get_peer(&addr).unwrap();
    assert_eq!(second_snapshot.state.height, first_snapshot.state.height);
    // The second call short-circuits before reaching the wire
    assert_eq!(stack.transport.calls(addr, endpoints::GET_STATUS), 1);
}

#[tokio::test]
async fn suspended_candidate_is_rejected_until_expiry() {
    let stack = stack();
    let addr = ip("10.0.0.11");
    register_responsive(&stack, addr, 1);

    stack
        .processor
        .suspend(addr, SuspensionReason::BadResponse, None);

    let err = stack
        .processor
        .validate_and_accept_peer(PeerInfo::new(addr, 4009), AcceptOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::StillSuspended(_)));

    // Re-suspend with an already-elapsed window; the candidate may re-enter
    stack
        .processor
        .suspend(addr, SuspensionReason::BadResponse, Some(-1));
    stack
        .processor
        .validate_and_accept_peer(PeerInfo::new(addr, 4009), AcceptOptions::default())
        .await
        .unwrap();
    assert!(stack.storage.has_peer(&addr));
}

#[tokio::test]
async fn reset_suspended_peers_drops_only_expired_windows() {
    let stack = stack();
    let expired = ip("10.0.0.12");
    let parked = ip("10.0.0.13");

    stack
        .processor
        .suspend(expired, SuspensionReason::Unresponsive, Some(-1));
    stack
        .processor
        .suspend(parked, SuspensionReason::Unresponsive, None);

    stack.processor.reset_suspended_peers();

    assert!(!stack.storage.has_suspended_peer(&expired));
    assert!(stack.storage.has_suspended_peer(&parked));
}

#[tokio::test]
async fn unresponsive_seed_is_suspended_not_active() {
    let stack = stack();
    let seed = ip("127.0.0.1");
    stack.transport.register(
        seed,
        RemoteScript {
            status: Some(status(1)),
            failure: Some(ScriptedFailure::Transport),
            ..Default::default()
        },
    );

    stack.monitor.populate_seed_peers().await.unwrap();

    assert!(!stack.storage.has_peer(&seed));
    assert_eq!(
        stack.storage.get_suspended_peer(&seed).unwrap().reason,
        SuspensionReason::Unresponsive
    );
}
