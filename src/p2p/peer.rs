//! Peer model: identity, probe state, verification and suspension records.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::chain::BlockSummary;
use crate::constants::{peering, suspension};

/// One network participant, keyed by IP
#[derive(Debug, Clone)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,

    /// Semver string the peer advertises
    pub version: Option<String>,

    /// Chain identifier the peer advertises
    pub nethash: Option<String>,

    /// Mutable probe state, refreshed on every successful ping
    pub state: PeerProbeState,

    /// Unix milliseconds of the last successful status refresh
    pub last_pinged: Option<i64>,

    /// Fork-check result; `None` means the peer has not been verified yet
    /// and is excluded from fork-majority calculations
    pub verification: Option<PeerVerification>,
}

impl Peer {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            version: None,
            nethash: None,
            state: PeerProbeState::default(),
            last_pinged: None,
            verification: None,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn is_forked(&self) -> bool {
        self.verification.as_ref().map(|v| v.forked).unwrap_or(false)
    }

    pub fn is_verified(&self) -> bool {
        self.verification.is_some()
    }

    /// Whether the last status refresh is recent enough to serve from cache
    pub fn recently_pinged(&self) -> bool {
        match self.last_pinged {
            Some(at) => Utc::now().timestamp_millis() - at < peering::PING_FRESHNESS_MS,
            None => false,
        }
    }
}

/// State a peer reported in its latest status reply
#[derive(Debug, Clone, Default)]
pub struct PeerProbeState {
    pub height: Option<u64>,
    pub current_slot: Option<u64>,
    pub forging_allowed: bool,
    pub header: Option<BlockSummary>,
}

impl PeerProbeState {
    /// A peer with no recorded state has never answered a status probe
    pub fn is_set(&self) -> bool {
        self.height.is_some()
    }
}

/// Outcome of checking a peer's chain against ours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerVerification {
    pub forked: bool,

    /// Highest block height both chains agree on; `None` when no common
    /// block was found at all
    pub highest_common_height: Option<u64>,
}

/// Why a peer was moved out of the active roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspensionReason {
    Unresponsive,
    BadResponse,
    InvalidVersion,
    NethashMismatch,
    Blacklisted,
    ForkCauser,
}

impl SuspensionReason {
    pub fn default_duration_secs(&self) -> i64 {
        match self {
            SuspensionReason::Unresponsive => suspension::UNRESPONSIVE_SECS,
            SuspensionReason::BadResponse => suspension::BAD_RESPONSE_SECS,
            SuspensionReason::InvalidVersion => suspension::INVALID_VERSION_SECS,
            SuspensionReason::NethashMismatch => suspension::NETHASH_MISMATCH_SECS,
            SuspensionReason::Blacklisted => suspension::BLACKLISTED_SECS,
            SuspensionReason::ForkCauser => suspension::FORK_CAUSER_SECS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionReason::Unresponsive => "unresponsive",
            SuspensionReason::BadResponse => "bad-response",
            SuspensionReason::InvalidVersion => "invalid-version",
            SuspensionReason::NethashMismatch => "nethash-mismatch",
            SuspensionReason::Blacklisted => "blacklisted",
            SuspensionReason::ForkCauser => "forked-fork-causer",
        }
    }
}

impl std::fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer parked until `until`; retained so it is not re-accepted early
#[derive(Debug, Clone)]
pub struct SuspendedPeer {
    pub peer: Peer,
    /// Unix seconds at which the suspension expires
    pub until: i64,
    pub reason: SuspensionReason,
}

impl SuspendedPeer {
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.until <= now_secs
    }
}

/// Candidate peer as it appears in seed lists, the cached snapshot, and
/// remote getPeers replies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub ip: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub version: Option<String>,
}

impl PeerInfo {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            version: None,
        }
    }

    /// Parse an "ip:port" seed entry
    pub fn parse(entry: &str) -> Option<Self> {
        let (ip, port) = entry.rsplit_once(':')?;
        Some(Self {
            ip: ip.parse().ok()?,
            port: port.parse().ok()?,
            version: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_ip_port_entries() {
        let info = PeerInfo::parse("127.0.0.1:4009").unwrap();
        assert_eq!(info.ip.to_string(), "127.0.0.1");
        assert_eq!(info.port, 4009);

        assert!(PeerInfo::parse("127.0.0.1").is_none());
        assert!(PeerInfo::parse("notanip:4009").is_none());
        assert!(PeerInfo::parse("127.0.0.1:notaport").is_none());
    }

    #[test]
    fn forked_requires_verification() {
        let mut peer = Peer::new("10.0.0.1".parse().unwrap(), 4009);
        assert!(!peer.is_forked());
        assert!(!peer.is_verified());

        peer.verification = Some(PeerVerification {
            forked: true,
            highest_common_height: Some(90),
        });
        assert!(peer.is_forked());
        assert!(peer.is_verified());
    }

    #[test]
    fn recently_pinged_tracks_freshness_window() {
        let mut peer = Peer::new("10.0.0.1".parse().unwrap(), 4009);
        assert!(!peer.recently_pinged());

        peer.last_pinged = Some(Utc::now().timestamp_millis());
        assert!(peer.recently_pinged());

        peer.last_pinged = Some(Utc::now().timestamp_millis() - 60_000);
        assert!(!peer.recently_pinged());
    }
}
