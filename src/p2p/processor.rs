//! Admission control.
//!
//! Every candidate - seed, cached or discovered - passes through
//! `validate_and_accept_peer` before it may enter the roster. Rejections are
//! recorded as suspensions so the same bad candidate is not re-examined on
//! every discovery pass.

use chrono::Utc;
use semver::{Version, VersionReq};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PeeringConfig;
use crate::events::{PeerEvent, PeerEventBus};
use crate::network_type::NetworkType;
use super::communicator::PeerCommunicator;
use super::error::AdmissionError;
use super::peer::{Peer, PeerInfo, SuspendedPeer, SuspensionReason};
use super::storage::PeerStorage;

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptOptions {
    /// Candidate comes from the seed list or the cached snapshot
    pub seed: bool,
    /// Drop per-candidate acceptance logging to debug level
    pub less_verbose: bool,
}

pub struct PeerProcessor {
    storage: Arc<PeerStorage>,
    communicator: Arc<PeerCommunicator>,
    events: Arc<PeerEventBus>,
    blacklist: HashSet<IpAddr>,
    version_requirements: Vec<VersionReq>,
    nethash: String,
    own_ip: Option<IpAddr>,
    own_version: String,
}

impl PeerProcessor {
    pub fn new(
        storage: Arc<PeerStorage>,
        communicator: Arc<PeerCommunicator>,
        events: Arc<PeerEventBus>,
        peering: &PeeringConfig,
        network: NetworkType,
    ) -> Self {
        let blacklist = peering
            .blacklist
            .iter()
            .filter_map(|entry| match entry.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!("Ignoring unparseable blacklist entry '{}'", entry);
                    None
                }
            })
            .collect();

        let version_requirements = peering
            .version_requirements(&network)
            .iter()
            .filter_map(|req| match VersionReq::parse(req) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Ignoring invalid version requirement '{}': {}", req, e);
                    None
                }
            })
            .collect();

        let own_ip = peering
            .external_address
            .as_deref()
            .and_then(|addr| addr.split(':').next())
            .and_then(|ip| ip.parse().ok());

        Self {
            storage,
            communicator,
            events,
            blacklist,
            version_requirements,
            nethash: network.nethash().to_string(),
            own_ip,
            own_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Vet a candidate and, if it passes, add it to the roster with an
    /// initial probe. Re-validating a known peer is a no-op.
    pub async fn validate_and_accept_peer(
        &self,
        candidate: PeerInfo,
        opts: AcceptOptions,
    ) -> Result<(), AdmissionError> {
        let ip = candidate.ip;

        if Some(ip) == self.own_ip {
            debug!("Skipping self-connection candidate {}", ip);
            return Err(AdmissionError::SelfConnection(ip.to_string()));
        }

        if self.blacklist.contains(&ip) {
            self.suspend_candidate(&candidate, SuspensionReason::Blacklisted, None);
            return Err(AdmissionError::Blacklisted(ip.to_string()));
        }

        if self.storage.has_peer(&ip) {
            return Ok(());
        }

        if let Some(suspended) = self.storage.get_suspended_peer(&ip) {
            if !suspended.is_expired(Utc::now().timestamp()) {
                return Err(AdmissionError::StillSuspended(ip.to_string()));
            }
            self.storage.forget_suspended_peer(&ip);
        }

        // Seeds without an advertised version inherit ours: they are
        // operator-chosen and presumed compatible.
        let version = candidate
            .version
            .clone()
            .or_else(|| opts.seed.then(|| self.own_version.clone()));

        if let Some(version) = &version {
            if !self.version_accepted(version) {
                self.suspend_candidate(&candidate, SuspensionReason::InvalidVersion, None);
                return Err(AdmissionError::VersionMismatch {
                    ip: ip.to_string(),
                    version: version.clone(),
                });
            }
        }

        let mut peer = Peer::new(ip, candidate.port);
        peer.version = version;
        self.storage.set_peer(peer.clone());

        // Initial probe; the reply also carries the fields only the peer
        // itself can vouch for.
        let status = match self
            .communicator
            .ping(&peer, self.communicator.global_timeout(), true)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                self.suspend(ip, SuspensionReason::Unresponsive, None);
                return Err(AdmissionError::Unreachable {
                    ip: ip.to_string(),
                    source: e,
                });
            }
        };

        if let Some(nethash) = &status.nethash {
            if *nethash != self.nethash {
                self.suspend(ip, SuspensionReason::NethashMismatch, None);
                return Err(AdmissionError::NethashMismatch {
                    ip: ip.to_string(),
                    nethash: nethash.clone(),
                });
            }
        }

        if let Some(version) = &status.version {
            if !self.version_accepted(version) {
                self.suspend(ip, SuspensionReason::InvalidVersion, None);
                return Err(AdmissionError::VersionMismatch {
                    ip: ip.to_string(),
                    version: version.clone(),
                });
            }
        }

        self.events.emit(PeerEvent::Added { ip });
        if opts.less_verbose {
            debug!("Accepted peer {}", peer.address());
        } else {
            info!("✓ Accepted peer {} (height {})", peer.address(), status.height);
        }
        Ok(())
    }

    /// Move a peer out of the active roster until the reason's suspension
    /// window elapses.
    pub fn suspend(
        &self,
        ip: IpAddr,
        reason: SuspensionReason,
        duration_secs: Option<i64>,
    ) {
        let peer = self
            .storage
            .get_peer(&ip)
            .or_else(|| self.storage.get_suspended_peer(&ip).map(|sp| sp.peer))
            .unwrap_or_else(|| Peer::new(ip, 0));

        let until =
            Utc::now().timestamp() + duration_secs.unwrap_or_else(|| reason.default_duration_secs());

        self.storage.set_suspended_peer(SuspendedPeer {
            peer,
            until,
            reason,
        });
        self.events.emit(PeerEvent::Suspended {
            ip,
            reason: reason.as_str().to_string(),
        });
        debug!("Suspended {} ({})", ip, reason);
    }

    /// Drop suspensions whose window has elapsed. The peer is not re-added;
    /// it re-enters through normal discovery.
    pub fn reset_suspended_peers(&self) {
        let now = Utc::now().timestamp();
        let mut cleared = 0;
        for suspended in self.storage.suspended_peers() {
            if suspended.is_expired(now) {
                self.storage.forget_suspended_peer(&suspended.peer.ip);
                cleared += 1;
            }
        }
        if cleared > 0 {
            debug!("Cleared {} expired suspension(s)", cleared);
        }
    }

    fn version_accepted(&self, version: &str) -> bool {
        let parsed = match Version::parse(version.trim_start_matches('v')) {
            Ok(v) => v,
            Err(_) => return false,
        };
        self.version_requirements.iter().any(|req| req.matches(&parsed))
    }

    fn suspend_candidate(
        &self,
        candidate: &PeerInfo,
        reason: SuspensionReason,
        duration_secs: Option<i64>,
    ) {
        if self.storage.has_peer(&candidate.ip) || self.storage.has_suspended_peer(&candidate.ip) {
            self.suspend(candidate.ip, reason, duration_secs);
            return;
        }
        let mut peer = Peer::new(candidate.ip, candidate.port);
        peer.version = candidate.version.clone();
        let until =
            Utc::now().timestamp() + duration_secs.unwrap_or_else(|| reason.default_duration_secs());
        self.storage.set_suspended_peer(SuspendedPeer {
            peer,
            until,
            reason,
        });
        self.events.emit(PeerEvent::Suspended {
            ip: candidate.ip,
            reason: reason.as_str().to_string(),
        });
    }
}
