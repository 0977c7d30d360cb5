use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

use super::messages::{BlockMessage, BroadcastOutcome, MessageResponse};
use crate::blockchain::{Block, Transaction};

/// Errors reaching a peer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Unexpected response from {peer}: {reason}")]
    BadResponse { peer: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Carries replication messages to a single peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_transaction(&self, peer: &str, transaction: &Transaction) -> Result<BroadcastOutcome, TransportError>;

    async fn send_block(&self, peer: &str, block: &Block) -> Result<BroadcastOutcome, TransportError>;

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, TransportError>;
}

/// JSON over HTTP, one short-timeout request per call
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    fn url(peer: &str, path: &str) -> String {
        if peer.starts_with("http://") || peer.starts_with("https://") {
            format!("{}{}", peer.trim_end_matches('/'), path)
        } else {
            format!("http://{}{}", peer, path)
        }
    }

    async fn classify(peer: &str, response: Response) -> BroadcastOutcome {
        let status = response.status();
        let message = response
            .json::<MessageResponse>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());

        if status.is_success() {
            BroadcastOutcome::Accepted
        } else if status == StatusCode::CONFLICT {
            warn!("Peer {} reported a conflict: {}", peer, message);
            BroadcastOutcome::Conflict(message)
        } else {
            warn!("Peer {} rejected broadcast: {}", peer, message);
            BroadcastOutcome::Rejected(message)
        }
    }

    fn unreachable(peer: &str, err: reqwest::Error) -> TransportError {
        TransportError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send_transaction(&self, peer: &str, transaction: &Transaction) -> Result<BroadcastOutcome, TransportError> {
        let response = self
            .client
            .post(Self::url(peer, "/broadcast-transaction"))
            .json(transaction)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        Ok(Self::classify(peer, response).await)
    }

    async fn send_block(&self, peer: &str, block: &Block) -> Result<BroadcastOutcome, TransportError> {
        let message = BlockMessage { block: block.clone() };
        let response = self
            .client
            .post(Self::url(peer, "/broadcast-block"))
            .json(&message)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        Ok(Self::classify(peer, response).await)
    }

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, TransportError> {
        let response = self
            .client
            .get(Self::url(peer, "/chain"))
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        if !response.status().is_success() {
            return Err(TransportError::BadResponse {
                peer: peer.to_string(),
                reason: response.status().to_string(),
            });
        }

        response.json().await.map_err(|e| TransportError::BadResponse {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_urls() {
        assert_eq!(HttpTransport::url("localhost:5001", "/chain"), "http://localhost:5001/chain");
        assert_eq!(HttpTransport::url("http://node-b:5000/", "/chain"), "http://node-b:5000/chain");
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();

        // Port 9 (discard) is closed on test machines
        let result = transport.fetch_chain("127.0.0.1:9").await;
        assert!(matches!(result, Err(TransportError::Unreachable { .. })));
    }
}
