//! Network monitor - the control plane of the peer subsystem.
//!
//! Owns the reactive loop that keeps the roster healthy: seeding, periodic
//! discovery and cleaning, network-state aggregation, fork detection, and
//! the block/transaction broadcast paths. Per-peer errors never escape the
//! pass that produced them; they become roster decisions and grouped log
//! lines.

use chrono::Utc;
use futures::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{Block, BlockSummary, ChainView, Slots, Transaction};
use crate::config::PeeringConfig;
use crate::constants::{broadcast, peering, sync};
use crate::error::AppError;
use crate::events::{PeerEvent, PeerEventBus};
use crate::probes;
use super::communicator::PeerCommunicator;
use super::error::SyncError;
use super::peer::{Peer, PeerInfo, PeerVerification, SuspensionReason};
use super::processor::{AcceptOptions, PeerProcessor};
use super::storage::PeerStorage;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Hosts for the startup DNS reachability probe (log-only)
    pub dns: Vec<String>,
    /// NTP servers for the startup clock probe (log-only)
    pub ntp: Vec<String>,
    /// Genesis-only mode: the update loop stays idle
    pub network_start: bool,
    /// Seed the roster, then stop - no discovery pass, no update loop
    pub skip_discovery: bool,
    pub disable_discovery: bool,
    pub ignore_minimum_network_reach: bool,
}

/// Snapshot of the network as derived from peer-reported state
#[derive(Debug, Clone)]
pub struct NetworkState {
    /// Lower-median of the heights peers report
    pub height: u64,
    pub pbft_forging_status: f64,
    /// Peers grouped by the latest block header they advertise, most
    /// populous group first
    pub header_groups: Vec<HeaderGroup>,
}

#[derive(Debug, Clone)]
pub struct HeaderGroup {
    pub header: BlockSummary,
    pub count: usize,
}

/// Verdict of the fork-majority check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    pub forked: bool,
    pub blocks_to_rollback: Option<u64>,
}

impl NetworkStatus {
    fn healthy() -> Self {
        Self {
            forked: false,
            blocks_to_rollback: None,
        }
    }
}

pub struct NetworkMonitor {
    config: PeeringConfig,
    storage: Arc<PeerStorage>,
    processor: Arc<PeerProcessor>,
    communicator: Arc<PeerCommunicator>,
    chain: Arc<dyn ChainView>,
    events: Arc<PeerEventBus>,
    slots: Slots,

    /// Peers restored from the previous run's snapshot, merged into the
    /// seed set at startup
    restored: Vec<PeerInfo>,

    /// Unix seconds until which eviction stays relaxed; written exactly once
    /// during `start` and immutable afterwards
    cold_start_until: OnceLock<i64>,

    initializing: AtomicBool,

    /// Latch guaranteeing a single pending update loop
    update_scheduled: AtomicBool,

    ignore_minimum_network_reach: AtomicBool,
    disable_discovery: AtomicBool,

    shutdown: CancellationToken,
}

impl NetworkMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PeeringConfig,
        storage: Arc<PeerStorage>,
        processor: Arc<PeerProcessor>,
        communicator: Arc<PeerCommunicator>,
        chain: Arc<dyn ChainView>,
        events: Arc<PeerEventBus>,
        slots: Slots,
        restored: Vec<PeerInfo>,
        shutdown: CancellationToken,
    ) -> Self {
        let disable_discovery = config.disable_discovery;
        Self {
            config,
            storage,
            processor,
            communicator,
            chain,
            events,
            slots,
            restored,
            cold_start_until: OnceLock::new(),
            initializing: AtomicBool::new(true),
            update_scheduled: AtomicBool::new(false),
            ignore_minimum_network_reach: AtomicBool::new(false),
            disable_discovery: AtomicBool::new(disable_discovery),
            shutdown,
        }
    }

    /// Bring the monitor up: cold-start window, reachability probes, seeds,
    /// first discovery pass, and the periodic update loop.
    pub async fn start(self: Arc<Self>, options: StartOptions) -> Result<(), AppError> {
        let cold_until = Utc::now().timestamp() + self.config.cold_start_secs;
        let _ = self.cold_start_until.set(cold_until);

        self.ignore_minimum_network_reach
            .store(options.ignore_minimum_network_reach, Ordering::SeqCst);
        if options.disable_discovery {
            self.disable_discovery.store(true, Ordering::SeqCst);
        }

        if !options.dns.is_empty() {
            probes::check_dns(&options.dns).await;
        }
        if !options.ntp.is_empty() {
            probes::check_ntp(&options.ntp).await;
        }

        self.populate_seed_peers().await?;

        if options.skip_discovery {
            info!("Skipping peer discovery as requested");
            self.initializing.store(false, Ordering::SeqCst);
            return Ok(());
        }

        self.update_network_status(options.network_start).await;
        Arc::clone(&self).schedule_update_network_status(options.network_start);
        self.initializing.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Feed the configured seeds, unioned with the restored snapshot,
    /// through admission. An empty seed list is fatal.
    pub async fn populate_seed_peers(&self) -> Result<(), AppError> {
        let seeds: Vec<PeerInfo> = self
            .config
            .seeds
            .iter()
            .filter_map(|entry| {
                let parsed = PeerInfo::parse(entry);
                if parsed.is_none() {
                    warn!("Ignoring unparseable seed entry '{}'", entry);
                }
                parsed
            })
            .collect();

        if seeds.is_empty() {
            return Err(AppError::NoSeedsConfigured);
        }

        let mut candidates: HashMap<IpAddr, PeerInfo> =
            seeds.into_iter().map(|s| (s.ip, s)).collect();
        for restored in &self.restored {
            candidates.entry(restored.ip).or_insert_with(|| restored.clone());
        }

        debug!("Seeding roster from {} candidate(s)", candidates.len());
        let accepts = candidates.into_values().map(|candidate| {
            let processor = Arc::clone(&self.processor);
            async move {
                let _ = processor
                    .validate_and_accept_peer(
                        candidate,
                        AcceptOptions {
                            seed: true,
                            less_verbose: true,
                        },
                    )
                    .await;
            }
        });
        join_all(accepts).await;
        Ok(())
    }

    /// One discovery + cleaning pass. No-op in genesis-only mode or with
    /// discovery disabled.
    pub async fn update_network_status(&self, network_start: bool) {
        if network_start {
            debug!("Genesis-only mode, skipping network status update");
            return;
        }
        if self.disable_discovery.load(Ordering::SeqCst) {
            debug!("Discovery disabled, skipping network status update");
            return;
        }

        self.discover_peers().await;
        self.clean_peers(false, false).await;
    }

    /// Arm the periodic update loop. The latch coalesces overlapping
    /// triggers: at most one loop runs, and its interval is recomputed each
    /// pass - the regular cadence while the roster is healthy, an aggressive
    /// reseed cadence while below minimum reach.
    pub fn schedule_update_network_status(self: Arc<Self>, network_start: bool) {
        if self.update_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let monitor = self;
        tokio::spawn(async move {
            let mut delay = Duration::from_secs(peering::STATUS_UPDATE_INTERVAL_SECS);
            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = sleep(delay) => {}
                }

                monitor.update_network_status(network_start).await;

                delay = if monitor.has_minimum_peers() {
                    Duration::from_secs(peering::STATUS_UPDATE_INTERVAL_SECS)
                } else {
                    if let Err(e) = monitor.populate_seed_peers().await {
                        error!("Reseeding failed: {}", e);
                    }
                    Duration::from_secs(peering::SEED_RETRY_INTERVAL_SECS)
                };
            }
            monitor.update_scheduled.store(false, Ordering::SeqCst);
        });
    }

    /// Ask peers for their peers, in random order, admitting every candidate
    /// in parallel. Stops once the roster has minimum reach AND enough peers
    /// answered the query.
    pub async fn discover_peers(&self) {
        let mut roster = self.storage.peers();
        {
            let mut rng = rand::thread_rng();
            roster.shuffle(&mut rng);
        }

        let mut queried = 0usize;
        for peer in roster {
            if self.has_minimum_peers() && queried >= peering::MIN_PEERS_QUERIED {
                break;
            }

            let candidates = match self.communicator.get_peers(&peer).await {
                Ok(candidates) => candidates,
                // A peer that cannot share its peers is cleaning's problem
                Err(_) => continue,
            };
            queried += 1;

            let accepts = candidates.into_iter().map(|candidate| {
                let processor = Arc::clone(&self.processor);
                async move {
                    let _ = processor
                        .validate_and_accept_peer(
                            candidate,
                            AcceptOptions {
                                seed: false,
                                less_verbose: true,
                            },
                        )
                        .await;
                }
            });
            join_all(accepts).await;
        }
    }

    /// Probe the whole roster in parallel and evict everything that does not
    /// answer. Evictions are grouped by error kind for logging and published
    /// as `peer.removed` events.
    pub async fn clean_peers(&self, fast: bool, force_ping: bool) {
        let snapshot = self.storage.peers();
        let max = snapshot.len();
        if max == 0 {
            return;
        }

        let ping_timeout = if fast {
            Duration::from_millis(peering::FAST_PING_TIMEOUT_MS)
        } else {
            self.communicator.global_timeout()
        };

        let probes = snapshot.into_iter().map(|peer| {
            let communicator = Arc::clone(&self.communicator);
            async move {
                let result = communicator.ping(&peer, ping_timeout, force_ping).await;
                (peer.ip, result)
            }
        });
        let results = join_all(probes).await;

        let mut unresponsive = 0usize;
        let mut by_kind: HashMap<&'static str, Vec<IpAddr>> = HashMap::new();
        for (ip, result) in results {
            if let Err(e) = result {
                unresponsive += 1;
                by_kind.entry(e.kind()).or_default().push(ip);
                self.events.emit(PeerEvent::Removed {
                    ip,
                    reason: e.kind().to_string(),
                });
                self.storage.forget_peer(&ip);
            }
        }

        for (kind, ips) in &by_kind {
            info!("Removed {} peer(s) because of {}", ips.len(), kind);
            debug!("  evicted: {:?}", ips);
        }

        if self.initializing.load(Ordering::SeqCst) {
            info!("{} of {} peers responsive", max - unresponsive, max);
            info!("Median network height: {}", self.network_height());
            info!("PBFT forging status: {:.2}", self.pbft_forging_status());
        }
    }

    /// Lower-median of peer-reported heights; 0 on an empty roster
    pub fn network_height(&self) -> u64 {
        let mut heights: Vec<u64> = self
            .storage
            .peers()
            .iter()
            .filter_map(|p| p.state.height)
            .collect();
        if heights.is_empty() {
            return 0;
        }
        heights.sort_unstable();
        heights[heights.len() / 2]
    }

    /// Fraction of in-slot peers that may forge and sit at or above the
    /// median network height. 0 when no peer is in the current slot.
    pub fn pbft_forging_status(&self) -> f64 {
        let slot = self.slots.current_slot();
        let height = self.network_height();

        let mut synced = 0usize;
        let mut allowed = 0usize;
        for peer in self.storage.peers() {
            if peer.state.current_slot == Some(slot) {
                synced += 1;
                if peer.state.forging_allowed && peer.state.height.map_or(false, |h| h >= height) {
                    allowed += 1;
                }
            }
        }

        if synced == 0 {
            0.0
        } else {
            allowed as f64 / synced as f64
        }
    }

    /// Build a fresh network snapshot. Outside the cold-start window this
    /// runs a fast forced cleaning first so the snapshot reflects live peers.
    pub async fn network_state(&self) -> NetworkState {
        if !self.is_cold_start_active() {
            self.clean_peers(true, true).await;
        }

        let mut groups: HashMap<BlockSummary, usize> = HashMap::new();
        for peer in self.storage.peers() {
            if let Some(header) = peer.state.header {
                *groups.entry(header).or_insert(0) += 1;
            }
        }
        let mut header_groups: Vec<HeaderGroup> = groups
            .into_iter()
            .map(|(header, count)| HeaderGroup { header, count })
            .collect();
        header_groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.header.height.cmp(&a.header.height))
        });

        NetworkState {
            height: self.network_height(),
            pbft_forging_status: self.pbft_forging_status(),
            header_groups,
        }
    }

    /// Fork-majority check over verified peer state.
    pub async fn check_network_health(&self) -> NetworkStatus {
        if !self.is_cold_start_active() {
            self.clean_peers(false, true).await;
            self.processor.reset_suspended_peers();
        }

        self.verify_unverified_peers().await;

        let last_block = self.chain.last_block().await;

        // Suspended peers only weigh in once verified; unverified suspects
        // would skew the majority either way.
        let mut peers: Vec<Peer> = self.storage.peers();
        peers.extend(
            self.storage
                .suspended_peers()
                .into_iter()
                .map(|sp| sp.peer)
                .filter(|p| p.is_verified()),
        );

        if peers.is_empty() {
            return NetworkStatus::healthy();
        }

        let forked = peers.iter().filter(|p| p.is_forked()).count();
        if (forked as f64) / (peers.len() as f64) < 0.5 {
            return NetworkStatus::healthy();
        }

        warn!(
            "🍴 {} of {} peers are on a different chain",
            forked,
            peers.len()
        );

        let mut groups: HashMap<u64, usize> = HashMap::new();
        for peer in &peers {
            if let Some(height) = peer
                .verification
                .as_ref()
                .and_then(|v| v.highest_common_height)
            {
                *groups.entry(height).or_insert(0) += 1;
            }
        }

        // Most populous group wins; ties go to the greatest common height
        let chosen = groups
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(height, _)| height);

        match (last_block, chosen) {
            (Some(last), Some(common_height)) => NetworkStatus {
                forked: true,
                blocks_to_rollback: Some(last.height.saturating_sub(common_height)),
            },
            _ => NetworkStatus {
                forked: true,
                blocks_to_rollback: None,
            },
        }
    }

    /// Run the common-block check against every active peer that answered a
    /// probe but has not been fork-verified yet.
    async fn verify_unverified_peers(&self) {
        let last_block = match self.chain.last_block().await {
            Some(block) => block,
            None => return,
        };
        let ids = self.chain.recent_block_ids().await;
        if ids.is_empty() {
            return;
        }

        let unverified: Vec<Peer> = self
            .storage
            .peers()
            .into_iter()
            .filter(|p| !p.is_verified() && p.state.is_set())
            .collect();
        if unverified.is_empty() {
            return;
        }

        let checks = unverified.into_iter().map(|peer| {
            let communicator = Arc::clone(&self.communicator);
            let ids = ids.clone();
            async move {
                let result = communicator.has_common_blocks(&peer, &ids).await;
                (peer, result)
            }
        });

        for (peer, result) in join_all(checks).await {
            let verification = match result {
                Ok(Some(common)) => PeerVerification {
                    forked: common.height < last_block.height,
                    highest_common_height: Some(common.height),
                },
                Ok(None) => PeerVerification {
                    forked: true,
                    highest_common_height: None,
                },
                // Leave unverified; the next health check retries
                Err(_) => continue,
            };
            self.storage.update_peer(&peer.ip, |p| {
                p.verification = Some(verification.clone());
            });
        }
    }

    /// Download a block batch from a random viable peer, with bounded
    /// backoff retries. Fails fast when every peer is suspended or forked.
    pub async fn sync_with_network(&self, from_height: u64) -> Result<Vec<Block>, SyncError> {
        let mut attempt = 0u32;
        let mut backoff = sync::BACKOFF_BASE;

        loop {
            if self.shutdown.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let viable: Vec<Peer> = self
                .storage
                .peers()
                .into_iter()
                .filter(|p| !p.is_forked() && !self.storage.has_suspended_peer(&p.ip))
                .collect();
            if viable.is_empty() {
                return Err(SyncError::NoViablePeers);
            }

            let peer = {
                let mut rng = rand::thread_rng();
                viable.choose(&mut rng).cloned()
            };
            let peer = match peer {
                Some(peer) => peer,
                None => return Err(SyncError::NoViablePeers),
            };

            match self.communicator.download_blocks(&peer, from_height).await {
                Ok(blocks) => {
                    debug!(
                        "Downloaded {} block(s) from {} starting at height {}",
                        blocks.len(),
                        peer.ip,
                        from_height
                    );
                    return Ok(blocks);
                }
                Err(e) => {
                    attempt += 1;
                    warn!(
                        "Block download from {} failed (attempt {}/{}): {}",
                        peer.ip,
                        attempt,
                        sync::MAX_ATTEMPTS,
                        e
                    );
                    if attempt >= sync::MAX_ATTEMPTS {
                        return Err(SyncError::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(SyncError::Cancelled),
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(sync::BACKOFF_CAP);
                }
            }
        }
    }

    /// Fan a block out to the roster. When the block ping shows the block
    /// has already hopped through us, each peer is kept with a probability
    /// that decays with the hop count; a fresh observation first waits out
    /// the aggregation window so late hops lower it further.
    pub async fn broadcast_block(&self, block: &Block) {
        if !self.chain.is_ready().await {
            debug!("Blockchain not ready, skipping broadcast of {}", block.id);
            return;
        }

        let mut peers = self.storage.peers();

        if let Some(ping) = self.chain.block_ping().await {
            if ping.block.id == block.id {
                let diff = ping.last_ms - ping.first_ms;
                let mut probability =
                    rebroadcast_probability(ping.count, broadcast::BLOCK_PING_MAX_HOPS);

                if diff < broadcast::BLOCK_PING_AGGREGATION_MS && probability > 0.0 {
                    let wait = (broadcast::BLOCK_PING_AGGREGATION_MS - diff)
                        .clamp(0, broadcast::BLOCK_PING_AGGREGATION_MS);
                    sleep(Duration::from_millis(wait as u64)).await;

                    let ping = match self.chain.block_ping().await {
                        Some(ping) => ping,
                        None => return,
                    };
                    if ping.block.id != block.id {
                        debug!(
                            "Newer block observed while aggregating, dropping broadcast of {}",
                            block.id
                        );
                        return;
                    }
                    probability =
                        rebroadcast_probability(ping.count, broadcast::BLOCK_PING_MAX_HOPS);
                }

                let before = peers.len();
                {
                    let mut rng = rand::thread_rng();
                    let p = probability.clamp(0.0, 1.0);
                    peers.retain(|_| rng.gen_bool(p));
                }
                debug!(
                    "Block ping damping kept {} of {} peer(s) (p={:.2})",
                    peers.len(),
                    before,
                    probability
                );
            }
        }

        if peers.is_empty() {
            debug!("No peers left to broadcast block {} to", block.id);
            return;
        }

        info!(
            "📡 Broadcasting block {} (height {}) to {} peer(s)",
            block.id,
            block.height,
            peers.len()
        );

        let posts = peers.into_iter().map(|peer| {
            let communicator = Arc::clone(&self.communicator);
            let block = block.clone();
            async move {
                // Best-effort gossip
                if let Err(e) = communicator.post_block(&peer, &block).await {
                    debug!("postBlock to {} failed: {}", peer.ip, e);
                }
            }
        });
        join_all(posts).await;
    }

    /// Fan transactions out to a shuffled subset of the roster
    pub async fn broadcast_transactions(&self, transactions: &[Transaction]) {
        if transactions.is_empty() {
            return;
        }

        let mut peers = self.storage.peers();
        {
            let mut rng = rand::thread_rng();
            peers.shuffle(&mut rng);
        }
        peers.truncate(self.config.max_peers_broadcast);

        if peers.is_empty() {
            debug!("No peers to broadcast transactions to");
            return;
        }

        debug!(
            "Broadcasting {} transaction(s) to {} peer(s)",
            transactions.len(),
            peers.len()
        );

        let posts = peers.into_iter().map(|peer| {
            let communicator = Arc::clone(&self.communicator);
            let transactions = transactions.to_vec();
            async move {
                if let Err(e) = communicator.post_transactions(&peer, &transactions).await {
                    debug!("postTransactions to {} failed: {}", peer.ip, e);
                }
            }
        });
        join_all(posts).await;
    }

    /// After a fork: re-probe everything, clear expired suspensions, and
    /// park the peer that served the forking block.
    pub async fn refresh_peers_after_fork(&self) {
        info!("🍴 Refreshing peers after fork");
        self.clean_peers(false, true).await;
        self.processor.reset_suspended_peers();

        if let Some(ip) = self.chain.forked_block_source().await {
            warn!("Suspending fork causer {}", ip);
            self.processor
                .suspend(ip, SuspensionReason::ForkCauser, None);
        }
    }

    pub fn has_minimum_peers(&self) -> bool {
        if self.ignore_minimum_network_reach.load(Ordering::SeqCst) {
            return true;
        }
        self.storage.count() >= self.config.minimum_network_reach
    }

    pub fn is_cold_start_active(&self) -> bool {
        self.cold_start_until
            .get()
            .map(|until| Utc::now().timestamp() < *until)
            .unwrap_or(false)
    }
}

/// Probability of forwarding a block that was already observed `count`
/// times. Bounds the expected message count at roughly N·(1-k/max_hop)
/// after k hops while preserving coverage.
fn rebroadcast_probability(count: u32, max_hop: u32) -> f64 {
    max_hop.saturating_sub(count) as f64 / max_hop as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChainView;
    use crate::config::Config;
    use crate::network_type::NetworkType;
    use crate::p2p::transport::MemoryTransport;

    fn monitor_with_storage() -> (Arc<NetworkMonitor>, Arc<PeerStorage>) {
        let storage = Arc::new(PeerStorage::new());
        let transport = Arc::new(MemoryTransport::new());
        let events = Arc::new(PeerEventBus::new());
        let config = Config::default().peering;
        let communicator = Arc::new(PeerCommunicator::new(
            transport,
            storage.clone(),
            config.global_timeout_ms,
        ));
        let processor = Arc::new(PeerProcessor::new(
            storage.clone(),
            communicator.clone(),
            events.clone(),
            &config,
            NetworkType::Testnet,
        ));
        let monitor = Arc::new(NetworkMonitor::new(
            config,
            storage.clone(),
            processor,
            communicator,
            Arc::new(InMemoryChainView::new()),
            events,
            // Slot windows wide enough that the current slot cannot tick
            // over while a test is running
            Slots::new(0, 1_000_000),
            Vec::new(),
            CancellationToken::new(),
        ));
        (monitor, storage)
    }

    fn peer_at_height(ip: &str, height: u64) -> Peer {
        let mut peer = Peer::new(ip.parse().unwrap(), 4009);
        peer.state.height = Some(height);
        peer
    }

    #[test]
    fn network_height_is_zero_on_empty_roster() {
        let (monitor, _) = monitor_with_storage();
        assert_eq!(monitor.network_height(), 0);
    }

    #[test]
    fn network_height_takes_the_lower_median() {
        let (monitor, storage) = monitor_with_storage();
        for (i, h) in [7u64, 3, 9, 1].iter().enumerate() {
            storage.set_peer(peer_at_height(&format!("10.0.0.{}", i + 1), *h));
        }
        // sorted: 1 3 7 9 -> index 2
        assert_eq!(monitor.network_height(), 7);

        storage.set_peer(peer_at_height("10.0.0.5", 5));
        // sorted: 1 3 5 7 9 -> index 2
        assert_eq!(monitor.network_height(), 5);
    }

    #[test]
    fn network_height_ignores_peers_without_state() {
        let (monitor, storage) = monitor_with_storage();
        storage.set_peer(Peer::new("10.0.0.1".parse().unwrap(), 4009));
        storage.set_peer(peer_at_height("10.0.0.2", 12));
        assert_eq!(monitor.network_height(), 12);
    }

    #[test]
    fn pbft_status_counts_only_in_slot_peers() {
        let (monitor, storage) = monitor_with_storage();
        let slot = monitor.slots.current_slot();

        let mut synced_forger = peer_at_height("10.0.0.1", 10);
        synced_forger.state.current_slot = Some(slot);
        synced_forger.state.forging_allowed = true;
        storage.set_peer(synced_forger);

        let mut synced_idle = peer_at_height("10.0.0.2", 10);
        synced_idle.state.current_slot = Some(slot);
        synced_idle.state.forging_allowed = false;
        storage.set_peer(synced_idle);

        let mut out_of_slot = peer_at_height("10.0.0.3", 10);
        out_of_slot.state.current_slot = Some(slot.wrapping_sub(1));
        out_of_slot.state.forging_allowed = true;
        storage.set_peer(out_of_slot);

        let status = monitor.pbft_forging_status();
        assert!((status - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn pbft_status_is_zero_without_synced_peers() {
        let (monitor, storage) = monitor_with_storage();
        storage.set_peer(peer_at_height("10.0.0.1", 10));
        assert_eq!(monitor.pbft_forging_status(), 0.0);
    }

    #[test]
    fn pbft_status_requires_median_height() {
        let (monitor, storage) = monitor_with_storage();
        let slot = monitor.slots.current_slot();

        // Median will be 10; the laggard at 5 may not forge
        for (ip, height) in [("10.0.0.1", 10u64), ("10.0.0.2", 10), ("10.0.0.3", 5)] {
            let mut peer = peer_at_height(ip, height);
            peer.state.current_slot = Some(slot);
            peer.state.forging_allowed = true;
            storage.set_peer(peer);
        }

        let status = monitor.pbft_forging_status();
        assert!((status - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn minimum_peers_honors_ignore_flag() {
        let (monitor, storage) = monitor_with_storage();
        assert!(!monitor.has_minimum_peers());

        monitor
            .ignore_minimum_network_reach
            .store(true, Ordering::SeqCst);
        assert!(monitor.has_minimum_peers());

        monitor
            .ignore_minimum_network_reach
            .store(false, Ordering::SeqCst);
        for i in 0..monitor.config.minimum_network_reach {
            storage.set_peer(peer_at_height(&format!("10.0.1.{}", i), 1));
        }
        assert!(monitor.has_minimum_peers());
    }

    #[test]
    fn rebroadcast_probability_decays_per_hop() {
        assert_eq!(rebroadcast_probability(0, 4), 1.0);
        assert_eq!(rebroadcast_probability(1, 4), 0.75);
        assert_eq!(rebroadcast_probability(2, 4), 0.5);
        assert_eq!(rebroadcast_probability(4, 4), 0.0);
        // Counts beyond the hop cap saturate at zero
        assert_eq!(rebroadcast_probability(9, 4), 0.0);
    }

    #[test]
    fn cold_start_defaults_to_inactive() {
        let (monitor, _) = monitor_with_storage();
        assert!(!monitor.is_cold_start_active());

        monitor
            .cold_start_until
            .set(Utc::now().timestamp() + 60)
            .unwrap();
        assert!(monitor.is_cold_start_active());
    }
}
