//! Configuration management for the relay daemon.
//!
//! Note: Some items appear as "dead code" in library checks because they're
//! only used by the binary (main.rs) - config path resolution, persistence
//! and the `--generate-config` flow.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::constants::peering;
use crate::network_type::NetworkType;

/// Platform-specific data directory for the relay daemon
#[allow(dead_code)]
pub fn get_data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relayd")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relayd")
    }
}

/// Network-specific subdirectory (mainnet uses the base directory directly)
#[allow(dead_code)]
pub fn get_network_data_dir(network: &NetworkType) -> PathBuf {
    let base = get_data_dir();
    match network {
        NetworkType::Mainnet => base,
        NetworkType::Testnet => base.join("testnet"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub peering: PeeringConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "testnet".to_string()
}

impl NodeConfig {
    pub fn network_type(&self) -> NetworkType {
        match self.network.to_lowercase().as_str() {
            "mainnet" => NetworkType::Mainnet,
            _ => NetworkType::Testnet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeeringConfig {
    /// Statically configured seed peers, "ip:port". A node without seeds
    /// cannot bootstrap; an empty list is fatal at startup.
    pub seeds: Vec<String>,

    /// IPs this node will never accept, regardless of what they advertise
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Semver requirements a candidate's version must satisfy (any match
    /// accepts). Empty means the network default applies.
    #[serde(default)]
    pub minimum_versions: Vec<String>,

    /// Our own advertised address, used to skip self-connections
    #[serde(default)]
    pub external_address: Option<String>,

    #[serde(default = "default_global_timeout_ms")]
    pub global_timeout_ms: u64,

    /// Peer count below which the node keeps reseeding aggressively
    #[serde(default = "default_minimum_network_reach")]
    pub minimum_network_reach: usize,

    /// Fan-out cap for transaction broadcasts
    #[serde(default = "default_max_peers_broadcast")]
    pub max_peers_broadcast: usize,

    /// Eviction grace window after startup (seconds)
    #[serde(default = "default_cold_start_secs")]
    pub cold_start_secs: i64,

    #[serde(default)]
    pub disable_discovery: bool,

    /// Hosts probed at startup to confirm DNS reachability (log-only)
    #[serde(default = "default_dns_hosts")]
    pub dns_hosts: Vec<String>,

    /// NTP servers probed at startup to report clock offset (log-only)
    #[serde(default = "default_ntp_hosts")]
    pub ntp_hosts: Vec<String>,
}

fn default_global_timeout_ms() -> u64 {
    peering::GLOBAL_TIMEOUT_MS
}

fn default_minimum_network_reach() -> usize {
    20
}

fn default_max_peers_broadcast() -> usize {
    20
}

fn default_cold_start_secs() -> i64 {
    30
}

fn default_dns_hosts() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
}

fn default_ntp_hosts() -> Vec<String> {
    vec![
        "time.google.com:123".to_string(),
        "time.cloudflare.com:123".to_string(),
        "pool.ntp.org:123".to_string(),
    ]
}

impl PeeringConfig {
    /// Version requirements with the per-network fallback applied
    pub fn version_requirements(&self, network: &NetworkType) -> Vec<String> {
        if self.minimum_versions.is_empty() {
            vec![network.default_minimum_version().to_string()]
        } else {
            self.minimum_versions.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                name: "relay".to_string(),
                network: default_network(),
            },
            peering: PeeringConfig {
                seeds: vec!["127.0.0.1:4009".to_string()],
                blacklist: Vec::new(),
                minimum_versions: Vec::new(),
                external_address: None,
                global_timeout_ms: default_global_timeout_ms(),
                minimum_network_reach: default_minimum_network_reach(),
                max_peers_broadcast: default_max_peers_broadcast(),
                cold_start_secs: default_cold_start_secs(),
                disable_discovery: false,
                dns_hosts: default_dns_hosts(),
                ntp_hosts: default_ntp_hosts(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "plain".to_string(),
            },
            storage: StorageConfig {
                data_dir: get_data_dir().to_string_lossy().to_string(),
            },
        }
    }
}

impl Config {
    #[allow(dead_code)]
    pub fn load_from_file(path: &str) -> Result<Self, crate::error::AppError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    #[allow(dead_code)]
    pub fn save_to_file(&self, path: &str) -> Result<(), crate::error::AppError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load the config file, or create a default one tuned to the network's
    /// data directory when none exists yet.
    #[allow(dead_code)]
    pub fn load_or_create(
        path: &str,
        network: &NetworkType,
    ) -> Result<Self, crate::error::AppError> {
        if fs::metadata(path).is_ok() {
            let contents = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.storage.data_dir = get_network_data_dir(network).to_string_lossy().to_string();
            config.save_to_file(path)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.node.network, "testnet");
        assert_eq!(parsed.peering.global_timeout_ms, 3_000);
        assert!(!parsed.peering.seeds.is_empty());
    }

    #[test]
    fn version_requirements_fall_back_to_network_default() {
        let config = Config::default();
        let reqs = config
            .peering
            .version_requirements(&NetworkType::Testnet);
        assert_eq!(reqs, vec![">=0.2.0".to_string()]);
    }
}
