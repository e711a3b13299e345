//! Protocol constants for the relay daemon.
//!
//! Centralizes the timing and fan-out parameters of the peer subsystem so
//! the control loop and its tests agree on one set of numbers.

/// Peer probing and discovery constants
pub mod peering {
    /// Default timeout for a unary peer call (milliseconds)
    pub const GLOBAL_TIMEOUT_MS: u64 = 3_000;

    /// Timeout used by fast cleaning passes (milliseconds)
    pub const FAST_PING_TIMEOUT_MS: u64 = 1_500;

    /// A status reply younger than this is served from cache instead of
    /// re-issuing the remote call (milliseconds)
    pub const PING_FRESHNESS_MS: i64 = 8_000;

    /// Interval between periodic network-status passes (seconds)
    pub const STATUS_UPDATE_INTERVAL_SECS: u64 = 600;

    /// Retry interval when the node is below minimum network reach (seconds)
    pub const SEED_RETRY_INTERVAL_SECS: u64 = 5;

    /// Discovery stops once this many peers answered getPeers and the
    /// minimum network reach is satisfied
    pub const MIN_PEERS_QUERIED: usize = 4;

    /// Hard cap on the number of entries accepted from a remote peer list
    pub const PEER_LIST_CAP: usize = 500;

    /// Upper bound on blocks returned by a single download batch
    pub const DOWNLOAD_BLOCKS_LIMIT: u64 = 400;
}

/// Block broadcast damping constants
pub mod broadcast {
    /// A block observed this many times locally is no longer rebroadcast
    pub const BLOCK_PING_MAX_HOPS: u32 = 4;

    /// Window during which a freshly observed block waits for further hops
    /// before the rebroadcast probability is fixed (milliseconds)
    pub const BLOCK_PING_AGGREGATION_MS: i64 = 500;
}

/// Bounded retry parameters for chain synchronization
pub mod sync {
    use std::time::Duration;

    pub const MAX_ATTEMPTS: u32 = 5;

    pub const BACKOFF_BASE: Duration = Duration::from_millis(500);

    pub const BACKOFF_CAP: Duration = Duration::from_secs(8);
}

/// Suspension durations per rejection reason (seconds)
pub mod suspension {
    /// Peer timed out or the transport failed
    pub const UNRESPONSIVE_SECS: i64 = 10 * 60;

    /// Peer answered with a malformed or rejected payload
    pub const BAD_RESPONSE_SECS: i64 = 30 * 60;

    /// Peer runs a version outside the accepted range
    pub const INVALID_VERSION_SECS: i64 = 6 * 60 * 60;

    /// Peer belongs to a different chain
    pub const NETHASH_MISMATCH_SECS: i64 = 24 * 60 * 60;

    /// Operator-banned IP
    pub const BLACKLISTED_SECS: i64 = 24 * 60 * 60;

    /// Peer served us the block that caused a fork
    pub const FORK_CAUSER_SECS: i64 = 24 * 60 * 60;
}
