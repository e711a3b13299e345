//! Error taxonomy of the peer subsystem.
//!
//! Per-peer RPC errors never escape the loop that issued them; they become
//! storage decisions (forget / suspend) plus grouped log counts, keyed by
//! the explicit `kind` tag below.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("peer did not respond within {0} ms")]
    Timeout(u64),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed reply: {0}")]
    BadResponse(String),

    #[error("peer rejected the payload: {0}")]
    Validation(String),

    #[error("peer application is not ready")]
    AppNotReady,
}

impl PeerError {
    /// Stable tag used to group eviction counts in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            PeerError::Timeout(_) => "timeout",
            PeerError::Transport(_) => "transport",
            PeerError::BadResponse(_) => "bad-response",
            PeerError::Validation(_) => "validation",
            PeerError::AppNotReady => "app-not-ready",
        }
    }

    /// Timeouts and transport failures both mean "nobody home"
    pub fn is_unresponsive(&self) -> bool {
        matches!(self, PeerError::Timeout(_) | PeerError::Transport(_))
    }
}

/// Why a candidate was turned away at admission
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("peer {0} is blacklisted")]
    Blacklisted(String),

    #[error("peer {ip} runs version {version} outside the accepted range")]
    VersionMismatch { ip: String, version: String },

    #[error("peer {ip} is on another chain (nethash {nethash})")]
    NethashMismatch { ip: String, nethash: String },

    #[error("peer {0} is currently suspended")]
    StillSuspended(String),

    #[error("refusing to peer with our own address {0}")]
    SelfConnection(String),

    #[error("initial probe of {ip} failed: {source}")]
    Unreachable {
        ip: String,
        #[source]
        source: PeerError,
    },
}

/// Errors surfaced by `sync_with_network` - the only peer errors callers see
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("could not pick a peer to sync from: all either banned or on a different chain")]
    NoViablePeers,

    #[error("giving up after {attempts} download attempts, last error: {last}")]
    Exhausted { attempts: u32, last: PeerError },

    #[error("sync cancelled by shutdown")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_tags() {
        assert_eq!(PeerError::Timeout(3000).kind(), "timeout");
        assert_eq!(PeerError::Transport("refused".into()).kind(), "transport");
        assert_eq!(PeerError::BadResponse("shape".into()).kind(), "bad-response");
        assert_eq!(PeerError::Validation("no".into()).kind(), "validation");
        assert_eq!(PeerError::AppNotReady.kind(), "app-not-ready");
    }

    #[test]
    fn unresponsive_covers_timeout_and_transport() {
        assert!(PeerError::Timeout(1500).is_unresponsive());
        assert!(PeerError::Transport("reset".into()).is_unresponsive());
        assert!(!PeerError::BadResponse("x".into()).is_unresponsive());
        assert!(!PeerError::AppNotReady.is_unresponsive());
    }
}
