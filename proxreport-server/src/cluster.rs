use std::time::Duration;

use futures_util::future::join_all;
use proxreport_core::NodeSummary;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::PeerConf;

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Another cluster member running proxreport.
#[derive(Clone, Debug)]
pub struct Peer {
    conf: PeerConf,
    client: reqwest::Client,
}

#[derive(thiserror::Error, Debug)]
pub enum PeerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("peer answered with status {0}")]
    Status(StatusCode),
}

impl Peer {
    pub fn new(conf: PeerConf) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .danger_accept_invalid_certs(conf.accept_invalid_certs)
            .build()?;
        Ok(Self { conf, client })
    }

    pub fn name(&self) -> &str {
        &self.conf.name
    }

    /// Fetch the peer's own node summary. The configured name replaces the
    /// hostname the peer reports.
    pub async fn fetch_summary(&self) -> Result<NodeSummary, PeerError> {
        let url = format!("{}/api/v1/summary", self.conf.url.trim_end_matches('/'));
        let mut req = self.client.get(&url);
        if let Some(username) = &self.conf.username {
            req = req.basic_auth(username, self.conf.password.as_ref());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(PeerError::Status(resp.status()));
        }

        let mut summary: NodeSummary = resp.json().await?;
        summary.name = self.conf.name.clone();
        debug!(peer = %self.conf.name, %url, "fetched peer summary");
        Ok(summary)
    }
}

/// Summaries of all peers, in the given order. Peers that cannot be read
/// are reported as unreachable.
pub async fn peer_summaries(peers: &[Peer]) -> Vec<NodeSummary> {
    join_all(peers.iter().map(|peer| async move {
        peer.fetch_summary().await.unwrap_or_else(|e| {
            warn!(peer = peer.name(), "peer unreachable: {e}");
            NodeSummary::unreachable(peer.name())
        })
    }))
    .await
}
