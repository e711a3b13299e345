//! Wire-layer seam of the peer subsystem.
//!
//! The monitor and communicator only ever talk to [`PeerTransport`]; the
//! socket server and worker pool live on the far side of it. Two
//! implementations ship in-tree: the HTTP unary client used by the daemon,
//! and a scriptable in-memory transport for tests and dry runs, mirroring
//! how the storage layer offers a memory backend.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;

use crate::chain::{Block, Transaction};
use super::error::PeerError;
use super::message::{
    CommonBlocksResponse, DownloadBlocksResponse, PeerListResponse, PostBlockResponse,
    PostTransactionsResponse, StatusResponse,
};
use super::peer::Peer;

/// Unary request endpoints, addressed `<prefix>.<scope>.<method>`
pub mod endpoints {
    pub const GET_STATUS: &str = "p2p.peer.getStatus";
    pub const GET_PEERS: &str = "p2p.peer.getPeers";
    pub const GET_COMMON_BLOCKS: &str = "p2p.peer.getCommonBlocks";
    pub const GET_BLOCKS: &str = "p2p.peer.getBlocks";
    pub const POST_BLOCK: &str = "p2p.peer.postBlock";
    pub const POST_TRANSACTIONS: &str = "p2p.peer.postTransactions";
}

/// Where a unary call goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl From<&Peer> for PeerAddr {
    fn from(peer: &Peer) -> Self {
        Self {
            ip: peer.ip,
            port: peer.port,
        }
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn get_status(&self, peer: &PeerAddr) -> Result<StatusResponse, PeerError>;

    async fn get_peers(&self, peer: &PeerAddr) -> Result<PeerListResponse, PeerError>;

    async fn get_common_blocks(
        &self,
        peer: &PeerAddr,
        ids: &[String],
    ) -> Result<CommonBlocksResponse, PeerError>;

    async fn download_blocks(
        &self,
        peer: &PeerAddr,
        from_height: u64,
    ) -> Result<DownloadBlocksResponse, PeerError>;

    async fn post_block(
        &self,
        peer: &PeerAddr,
        block: &Block,
    ) -> Result<PostBlockResponse, PeerError>;

    async fn post_transactions(
        &self,
        peer: &PeerAddr,
        transactions: &[Transaction],
    ) -> Result<PostTransactionsResponse, PeerError>;
}

/// Production transport: JSON unary calls over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        // Per-call deadlines are enforced by the communicator; the client
        // only bounds connection establishment.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        peer: &PeerAddr,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<R, PeerError> {
        let url = format!("http://{}/{}", peer, endpoint);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(PeerError::AppNotReady);
        }
        if status.is_client_error() {
            return Err(PeerError::Validation(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(PeerError::Transport(format!("HTTP {}", status)));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| PeerError::BadResponse(e.to_string()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn get_status(&self, peer: &PeerAddr) -> Result<StatusResponse, PeerError> {
        self.call(peer, endpoints::GET_STATUS, serde_json::json!({})).await
    }

    async fn get_peers(&self, peer: &PeerAddr) -> Result<PeerListResponse, PeerError> {
        self.call(peer, endpoints::GET_PEERS, serde_json::json!({})).await
    }

    async fn get_common_blocks(
        &self,
        peer: &PeerAddr,
        ids: &[String],
    ) -> Result<CommonBlocksResponse, PeerError> {
        self.call(
            peer,
            endpoints::GET_COMMON_BLOCKS,
            serde_json::json!({ "ids": ids }),
        )
        .await
    }

    async fn download_blocks(
        &self,
        peer: &PeerAddr,
        from_height: u64,
    ) -> Result<DownloadBlocksResponse, PeerError> {
        self.call(
            peer,
            endpoints::GET_BLOCKS,
            serde_json::json!({ "lastBlockHeight": from_height }),
        )
        .await
    }

    async fn post_block(
        &self,
        peer: &PeerAddr,
        block: &Block,
    ) -> Result<PostBlockResponse, PeerError> {
        self.call(
            peer,
            endpoints::POST_BLOCK,
            serde_json::json!({ "block": block }),
        )
        .await
    }

    async fn post_transactions(
        &self,
        peer: &PeerAddr,
        transactions: &[Transaction],
    ) -> Result<PostTransactionsResponse, PeerError> {
        self.call(
            peer,
            endpoints::POST_TRANSACTIONS,
            serde_json::json!({ "transactions": transactions }),
        )
        .await
    }
}

/// How a scripted remote should fail, across all endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Timeout,
    Transport,
    BadResponse,
    Validation,
    AppNotReady,
    /// Sleep past any reasonable deadline so the caller's timeout fires
    Hang,
}

impl ScriptedFailure {
    fn to_error(self) -> PeerError {
        match self {
            ScriptedFailure::Timeout => PeerError::Timeout(0),
            ScriptedFailure::Transport => PeerError::Transport("connection reset".to_string()),
            ScriptedFailure::BadResponse => {
                PeerError::BadResponse("unexpected reply shape".to_string())
            }
            ScriptedFailure::Validation => PeerError::Validation("payload rejected".to_string()),
            ScriptedFailure::AppNotReady => PeerError::AppNotReady,
            ScriptedFailure::Hang => PeerError::Transport("unreachable".to_string()),
        }
    }
}

/// Scripted behavior of one simulated remote
#[derive(Debug, Clone, Default)]
pub struct RemoteScript {
    pub status: Option<StatusResponse>,
    pub peers: Vec<super::peer::PeerInfo>,
    pub common: Option<crate::chain::BlockSummary>,
    pub blocks: Vec<Block>,
    pub failure: Option<ScriptedFailure>,
}

/// In-memory transport: every registered IP behaves as scripted, everything
/// else refuses the connection.
pub struct MemoryTransport {
    remotes: DashMap<IpAddr, RemoteScript>,
    calls: DashMap<(IpAddr, &'static str), usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            remotes: DashMap::new(),
            calls: DashMap::new(),
        }
    }

    pub fn register(&self, ip: IpAddr, script: RemoteScript) {
        self.remotes.insert(ip, script);
    }

    pub fn set_failure(&self, ip: IpAddr, failure: Option<ScriptedFailure>) {
        if let Some(mut script) = self.remotes.get_mut(&ip) {
            script.failure = failure;
        }
    }

    /// How many times `endpoint` was invoked against `ip`
    pub fn calls(&self, ip: IpAddr, endpoint: &'static str) -> usize {
        self.calls
            .get(&(ip, endpoint))
            .map(|c| *c.value())
            .unwrap_or(0)
    }

    /// Total invocations of `endpoint` across all remotes
    pub fn total_calls(&self, endpoint: &'static str) -> usize {
        self.calls
            .iter()
            .filter(|entry| entry.key().1 == endpoint)
            .map(|entry| *entry.value())
            .sum()
    }

    async fn dispatch(&self, ip: IpAddr, endpoint: &'static str) -> Result<RemoteScript, PeerError> {
        *self.calls.entry((ip, endpoint)).or_insert(0) += 1;

        let script = self
            .remotes
            .get(&ip)
            .map(|s| s.value().clone())
            .ok_or_else(|| PeerError::Transport("connection refused".to_string()))?;

        if let Some(failure) = script.failure {
            if failure == ScriptedFailure::Hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            return Err(failure.to_error());
        }
        Ok(script)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn get_status(&self, peer: &PeerAddr) -> Result<StatusResponse, PeerError> {
        let script = self.dispatch(peer.ip, endpoints::GET_STATUS).await?;
        script
            .status
            .ok_or_else(|| PeerError::BadResponse("no status scripted".to_string()))
    }

    async fn get_peers(&self, peer: &PeerAddr) -> Result<PeerListResponse, PeerError> {
        let script = self.dispatch(peer.ip, endpoints::GET_PEERS).await?;
        Ok(PeerListResponse {
            success: true,
            peers: script.peers,
        })
    }

    async fn get_common_blocks(
        &self,
        peer: &PeerAddr,
        ids: &[String],
    ) -> Result<CommonBlocksResponse, PeerError> {
        let script = self.dispatch(peer.ip, endpoints::GET_COMMON_BLOCKS).await?;
        let common = script
            .common
            .filter(|c| ids.iter().any(|id| *id == c.id));
        Ok(CommonBlocksResponse {
            success: true,
            common,
        })
    }

    async fn download_blocks(
        &self,
        peer: &PeerAddr,
        from_height: u64,
    ) -> Result<DownloadBlocksResponse, PeerError> {
        let script = self.dispatch(peer.ip, endpoints::GET_BLOCKS).await?;
        let blocks = script
            .blocks
            .into_iter()
            .filter(|b| b.height >= from_height)
            .collect();
        Ok(DownloadBlocksResponse {
            success: true,
            blocks,
        })
    }

    async fn post_block(
        &self,
        peer: &PeerAddr,
        _block: &Block,
    ) -> Result<PostBlockResponse, PeerError> {
        self.dispatch(peer.ip, endpoints::POST_BLOCK).await?;
        Ok(PostBlockResponse { success: true })
    }

    async fn post_transactions(
        &self,
        peer: &PeerAddr,
        _transactions: &[Transaction],
    ) -> Result<PostTransactionsResponse, PeerError> {
        self.dispatch(peer.ip, endpoints::POST_TRANSACTIONS).await?;
        Ok(PostTransactionsResponse {
            success: true,
            transactions_ids: Vec::new(),
        })
    }
}
