//! # Peer Transport
//!
//! Every outbound call one node makes to another goes through the
//! [`NetworkClient`] trait. The peer directory and bootstrap sequence only
//! ever see the trait, which keeps them testable against an in-process
//! double and keeps HTTP details in one place.
//!
//! ## Routes
//!
//! | Call                    | Request                                      |
//! |-------------------------|----------------------------------------------|
//! | `broadcast_peer`        | `POST {addr}/network/node?broadcast=true`    |
//! | `register_self`         | `POST {addr}/network/node?broadcast=true`    |
//! | `broadcast_block`       | `POST {addr}/blockchain/block`               |
//! | `download_peers`        | `GET  {addr}/network`                        |
//! | `download_peer_info`    | `GET  {addr}/status`                         |
//! | `download_blockchain`   | `GET  {addr}/blockchain?page={n}&size=10`    |
//! | `download_latest_block` | `GET  {addr}/blockchain?page=0&size=1&sort=DESC` |
//!
//! Both peer announcements carry `broadcast=true`. A node that learns of a
//! new peer passes it on to everyone it knows, so the announcement reaches
//! peers the donor has never met. The flood stops on its own: a node that
//! already holds the peer ignores it and forwards nothing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::node::{normalize_address, Node, NodeInfo, PeerList};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::ledger::Block;

/// Failures talking to (or about) a peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("peer address must not be blank")]
    BlankAddress,

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("request to {0} timed out")]
    Timeout(String),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Outbound calls to other nodes.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Tell `address` about `node` without asking it to forward.
    async fn broadcast_peer(&self, address: &str, node: &Node) -> NetworkResult<()>;

    /// Push a block to `address`. A 4xx verdict from the peer is an error
    /// here; the fan-out counts it as a failed delivery.
    async fn broadcast_block(&self, address: &str, block: &Block) -> NetworkResult<()>;

    async fn download_peers(&self, address: &str) -> NetworkResult<Vec<Node>>;

    async fn download_peer_info(&self, address: &str) -> NetworkResult<NodeInfo>;

    /// One ascending page of [`DEFAULT_PAGE_SIZE`] blocks. Empty past the end.
    async fn download_blockchain(&self, address: &str, page: usize) -> NetworkResult<Vec<Block>>;

    /// The peer's tip, `None` if its chain is empty.
    async fn download_latest_block(&self, address: &str) -> NetworkResult<Option<Block>>;

    /// Register `node` with `address`, asking it to introduce us onward.
    async fn register_self(&self, address: &str, node: &Node) -> NetworkResult<()>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`NetworkClient`] over HTTP/JSON with reqwest.
#[derive(Debug, Clone)]
pub struct HttpNetworkClient {
    client: Client,
}

impl HttpNetworkClient {
    /// Build a client whose every request gives up after `timeout`.
    pub fn new(timeout: Duration) -> NetworkResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> NetworkResult<T> {
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url,
                status: status.as_u16(),
            });
        }
        resp.json::<T>().await.map_err(|e| NetworkError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    async fn post_json<B: Serialize + Sync>(&self, url: String, body: &B) -> NetworkResult<StatusCode> {
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(NetworkError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn broadcast_peer(&self, address: &str, node: &Node) -> NetworkResult<()> {
        self.post_json(announce_url(address)?, node).await.map(drop)
    }

    async fn broadcast_block(&self, address: &str, block: &Block) -> NetworkResult<()> {
        let url = format!("{}/blockchain/block", base(address)?);
        self.post_json(url, block).await.map(drop)
    }

    async fn download_peers(&self, address: &str) -> NetworkResult<Vec<Node>> {
        let url = format!("{}/network", base(address)?);
        let list: PeerList = self.get_json(url).await?;
        Ok(list.peers)
    }

    async fn download_peer_info(&self, address: &str) -> NetworkResult<NodeInfo> {
        let url = format!("{}/status", base(address)?);
        self.get_json(url).await
    }

    async fn download_blockchain(&self, address: &str, page: usize) -> NetworkResult<Vec<Block>> {
        let url = format!(
            "{}/blockchain?page={page}&size={DEFAULT_PAGE_SIZE}",
            base(address)?
        );
        self.get_json(url).await
    }

    async fn download_latest_block(&self, address: &str) -> NetworkResult<Option<Block>> {
        let url = format!("{}/blockchain?page=0&size=1&sort=DESC", base(address)?);
        let blocks: Vec<Block> = self.get_json(url).await?;
        Ok(blocks.into_iter().next())
    }

    async fn register_self(&self, address: &str, node: &Node) -> NetworkResult<()> {
        let url = announce_url(address)?;
        let status = self.post_json(url.clone(), node).await?;
        if status == StatusCode::CREATED {
            Ok(())
        } else {
            Err(NetworkError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }
}

fn base(address: &str) -> NetworkResult<String> {
    let address = normalize_address(address);
    if address.is_empty() {
        Err(NetworkError::BlankAddress)
    } else {
        Ok(address)
    }
}

/// `POST` target for announcing a peer. The receiver always floods it on.
fn announce_url(address: &str) -> NetworkResult<String> {
    Ok(format!("{}/network/node?broadcast=true", base(address)?))
}

fn transport_error(url: &str, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout(url.to_string())
    } else {
        NetworkError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_strips_trailing_slash() {
        assert_eq!(base("http://a:8080/").unwrap(), "http://a:8080");
        assert_eq!(base("  "), Err(NetworkError::BlankAddress));
    }

    #[test]
    fn test_peer_announcements_ask_the_receiver_to_forward() {
        assert_eq!(
            announce_url("http://a:8080/").unwrap(),
            "http://a:8080/network/node?broadcast=true"
        );
        assert_eq!(announce_url(""), Err(NetworkError::BlankAddress));
    }

    #[tokio::test]
    async fn test_blank_address_fails_before_any_io() {
        let client = HttpNetworkClient::new(Duration::from_millis(50)).unwrap();
        assert_eq!(
            client.download_peers("").await,
            Err(NetworkError::BlankAddress)
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_a_transport_error() {
        let client = HttpNetworkClient::new(Duration::from_millis(500)).unwrap();
        // Port 9 on loopback: nothing listens there in a test sandbox.
        let err = client.download_peer_info("http://127.0.0.1:9").await.unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Transport { .. } | NetworkError::Timeout(_)
        ));
    }
}
