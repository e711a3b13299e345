use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkType {
    Mainnet,
    Testnet,
}

impl NetworkType {
    /// Hex identifier of the chain this node relays for. Peers advertising a
    /// different nethash are on another chain entirely and are rejected at
    /// admission.
    pub fn nethash(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => {
                "6e84d08bd299ed97c212c886c98a57e36545c8f5d645ca7eeae63a8bd62d8988"
            }
            NetworkType::Testnet => {
                "d9acd04bde4234a81addb8482333b4ac906bed7be5a9970ce8ada428bd083192"
            }
        }
    }

    pub fn default_p2p_port(&self) -> u16 {
        match self {
            NetworkType::Mainnet => 4001,
            NetworkType::Testnet => 4009,
        }
    }

    /// Lowest peer version this network accepts when the operator does not
    /// configure `[peering] minimum_versions` explicitly.
    pub fn default_minimum_version(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => ">=0.3.0",
            NetworkType::Testnet => ">=0.2.0",
        }
    }

    #[allow(dead_code)]
    pub fn genesis_timestamp(&self) -> i64 {
        1735689600 // January 1, 2025 00:00:00 UTC (both networks)
    }

    pub fn block_time_seconds(&self) -> i64 {
        8
    }
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Mainnet => write!(f, "Mainnet"),
            NetworkType::Testnet => write!(f, "Testnet"),
        }
    }
}
