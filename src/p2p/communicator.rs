//! Unary call façade over the wire transport.
//!
//! Every call carries an explicit deadline; replies are validated and folded
//! back into peer state before the caller sees them. The freshness cache on
//! `ping` keeps hot paths from hammering the same peer with status probes.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chain::{Block, BlockSummary, Transaction};
use crate::constants::peering;
use super::error::PeerError;
use super::message::{PostBlockResponse, PostTransactionsResponse, StatusResponse};
use super::peer::{Peer, PeerInfo};
use super::storage::PeerStorage;
use super::transport::PeerTransport;

pub struct PeerCommunicator {
    transport: Arc<dyn PeerTransport>,
    storage: Arc<PeerStorage>,
    global_timeout: Duration,
}

impl PeerCommunicator {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        storage: Arc<PeerStorage>,
        global_timeout_ms: u64,
    ) -> Self {
        Self {
            transport,
            storage,
            global_timeout: Duration::from_millis(global_timeout_ms),
        }
    }

    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    async fn with_deadline<T>(
        &self,
        deadline: Duration,
        call: impl std::future::Future<Output = Result<T, PeerError>>,
    ) -> Result<T, PeerError> {
        tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| PeerError::Timeout(deadline.as_millis() as u64))?
    }

    /// Refresh a peer's status. Serves the cached state when the peer was
    /// pinged within the freshness window, unless `force_ping` is set.
    pub async fn ping(
        &self,
        peer: &Peer,
        timeout: Duration,
        force_ping: bool,
    ) -> Result<StatusResponse, PeerError> {
        if !force_ping {
            if let Some(current) = self.storage.get_peer(&peer.ip) {
                if current.recently_pinged() {
                    if let Some(cached) = cached_status(&current) {
                        debug!("Serving cached status for {}", peer.ip);
                        return Ok(cached);
                    }
                }
            }
        }

        let status = self
            .with_deadline(timeout, self.transport.get_status(&peer.into()))
            .await?;
        validate_status(&status)?;

        let now = Utc::now().timestamp_millis();
        self.storage.update_peer(&peer.ip, |p| {
            p.state.height = Some(status.height);
            p.state.current_slot = Some(status.current_slot);
            p.state.forging_allowed = status.forging_allowed;
            p.state.header = status.header.clone();
            if status.version.is_some() {
                p.version = status.version.clone();
            }
            if status.nethash.is_some() {
                p.nethash = status.nethash.clone();
            }
            p.last_pinged = Some(now);
        });

        Ok(status)
    }

    /// Raw status call with the default deadline; no cache, no state update
    pub async fn get_status(&self, peer: &Peer) -> Result<StatusResponse, PeerError> {
        let status = self
            .with_deadline(self.global_timeout, self.transport.get_status(&peer.into()))
            .await?;
        validate_status(&status)?;
        Ok(status)
    }

    /// Fetch the remote's known peers, capped to a sane list size
    pub async fn get_peers(&self, peer: &Peer) -> Result<Vec<PeerInfo>, PeerError> {
        let reply = self
            .with_deadline(self.global_timeout, self.transport.get_peers(&peer.into()))
            .await?;
        if !reply.success {
            return Err(PeerError::BadResponse(
                "peer list reply flagged unsuccessful".to_string(),
            ));
        }

        let mut peers = reply.peers;
        if peers.len() > peering::PEER_LIST_CAP {
            debug!(
                "Capping peer list from {} at {} entries",
                peer.ip,
                peering::PEER_LIST_CAP
            );
            peers.truncate(peering::PEER_LIST_CAP);
        }
        Ok(peers)
    }

    pub async fn get_common_blocks(
        &self,
        peer: &Peer,
        ids: &[String],
    ) -> Result<Option<BlockSummary>, PeerError> {
        let reply = self
            .with_deadline(
                self.global_timeout,
                self.transport.get_common_blocks(&peer.into(), ids),
            )
            .await?;
        if !reply.success {
            return Err(PeerError::BadResponse(
                "common block reply flagged unsuccessful".to_string(),
            ));
        }
        Ok(reply.common)
    }

    /// `get_common_blocks` with the "no common block" case logged; returns
    /// the highest shared block, or `None` when the chains share nothing
    pub async fn has_common_blocks(
        &self,
        peer: &Peer,
        ids: &[String],
    ) -> Result<Option<BlockSummary>, PeerError> {
        let common = self.get_common_blocks(peer, ids).await?;
        if common.is_none() {
            debug!("No common blocks with {}", peer.ip);
        }
        Ok(common)
    }

    /// Fetch a block batch. A successful download raises the peer's recorded
    /// height to the highest block returned.
    pub async fn download_blocks(
        &self,
        peer: &Peer,
        from_height: u64,
    ) -> Result<Vec<Block>, PeerError> {
        let reply = self
            .with_deadline(
                self.global_timeout,
                self.transport.download_blocks(&peer.into(), from_height),
            )
            .await?;
        if !reply.success {
            return Err(PeerError::BadResponse(
                "block download flagged unsuccessful".to_string(),
            ));
        }

        let mut blocks = reply.blocks;
        if blocks.len() as u64 > peering::DOWNLOAD_BLOCKS_LIMIT {
            blocks.truncate(peering::DOWNLOAD_BLOCKS_LIMIT as usize);
        }

        if let Some(highest) = blocks.iter().map(|b| b.height).max() {
            self.storage.update_peer(&peer.ip, |p| {
                p.state.height = Some(highest);
            });
        }
        Ok(blocks)
    }

    pub async fn post_block(
        &self,
        peer: &Peer,
        block: &Block,
    ) -> Result<PostBlockResponse, PeerError> {
        let ack = self
            .with_deadline(
                self.global_timeout,
                self.transport.post_block(&peer.into(), block),
            )
            .await?;
        if !ack.success {
            return Err(PeerError::Validation(format!(
                "peer {} rejected block {}",
                peer.ip, block.id
            )));
        }
        Ok(ack)
    }

    pub async fn post_transactions(
        &self,
        peer: &Peer,
        transactions: &[Transaction],
    ) -> Result<PostTransactionsResponse, PeerError> {
        let ack = self
            .with_deadline(
                self.global_timeout,
                self.transport.post_transactions(&peer.into(), transactions),
            )
            .await?;
        if !ack.success {
            return Err(PeerError::Validation(format!(
                "peer {} rejected the transaction batch",
                peer.ip
            )));
        }
        Ok(ack)
    }
}

fn validate_status(status: &StatusResponse) -> Result<(), PeerError> {
    if !status.success {
        return Err(PeerError::BadResponse(
            "status reply flagged unsuccessful".to_string(),
        ));
    }
    if status.header.is_none() {
        return Err(PeerError::BadResponse("status reply missing header".to_string()));
    }
    Ok(())
}

/// Rebuild a status reply from the state recorded at the last refresh
fn cached_status(peer: &Peer) -> Option<StatusResponse> {
    let height = peer.state.height?;
    let header = peer.state.header.clone()?;
    Some(StatusResponse {
        success: true,
        height,
        forging_allowed: peer.state.forging_allowed,
        current_slot: peer.state.current_slot.unwrap_or(0),
        header: Some(header),
        nethash: peer.nethash.clone(),
        version: peer.version.clone(),
    })
}
