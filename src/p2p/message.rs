//! Wire DTOs for the unary peer protocol.
//!
//! Field names follow the wire's camelCase convention.

use serde::{Deserialize, Serialize};

use crate::chain::BlockSummary;
use super::peer::PeerInfo;

/// Reply to `p2p.peer.getStatus`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub height: u64,
    pub forging_allowed: bool,
    pub current_slot: u64,
    #[serde(default)]
    pub header: Option<BlockSummary>,
    #[serde(default)]
    pub nethash: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Reply to `p2p.peer.getPeers`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerListResponse {
    pub success: bool,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

/// Reply to `p2p.peer.getCommonBlocks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonBlocksResponse {
    pub success: bool,
    /// The highest block both chains share, if any
    #[serde(default)]
    pub common: Option<BlockSummary>,
}

/// Reply to `p2p.peer.getBlocks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadBlocksResponse {
    pub success: bool,
    #[serde(default)]
    pub blocks: Vec<crate::chain::Block>,
}

/// Reply to `p2p.peer.postBlock`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBlockResponse {
    pub success: bool,
}

/// Reply to `p2p.peer.postTransactions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostTransactionsResponse {
    pub success: bool,
    #[serde(default)]
    pub transactions_ids: Vec<String>,
}
