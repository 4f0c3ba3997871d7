//! # Peer Directory
//!
//! The set of nodes this node knows about, plus best-effort flooding of new
//! peers and new blocks to all of them.
//!
//! ## Membership
//!
//! Peers are kept in discovery order and are unique by address. Checking for
//! a duplicate, inserting, and snapshotting who to tell all happen under a
//! single write lock, so two concurrent admissions of the same address
//! produce exactly one insert and one broadcast.
//!
//! ## Fan-out
//!
//! A broadcast is spawned onto the runtime and never holds the peer lock.
//! Calls go out concurrently (bounded by `max_concurrent_broadcasts`), each
//! under its own `request_timeout`. A peer that errors or times out is
//! logged and counted; it never stops delivery to the rest, and nobody is
//! retried.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{NetworkClient, NetworkError, NetworkResult};
use super::node::{normalize_address, Node};
use crate::config::{MAX_CONCURRENT_BROADCASTS, PEER_REQUEST_TIMEOUT};
use crate::ledger::Block;

// ---------------------------------------------------------------------------
// Configuration & reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PeerDirectoryConfig {
    /// Per-call deadline for every outbound broadcast.
    pub request_timeout: Duration,
    /// Upper bound on in-flight calls within one fan-out.
    pub max_concurrent_broadcasts: usize,
}

impl Default for PeerDirectoryConfig {
    fn default() -> Self {
        Self {
            request_timeout: PEER_REQUEST_TIMEOUT,
            max_concurrent_broadcasts: MAX_CONCURRENT_BROADCASTS,
        }
    }
}

/// Tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Result of [`PeerDirectory::add_peer`].
#[derive(Debug)]
pub struct PeerAdmission {
    /// `false` if the address was already known (or is our own).
    pub added: bool,
    /// The spawned broadcast, when one was started.
    pub fan_out: Option<JoinHandle<FanOutReport>>,
}

#[derive(Debug, Clone)]
enum Payload {
    Peer(Node),
    Block(Block),
}

impl Payload {
    async fn deliver(&self, client: &dyn NetworkClient, address: &str) -> NetworkResult<()> {
        match self {
            Self::Peer(node) => client.broadcast_peer(address, node).await,
            Self::Block(block) => client.broadcast_block(address, block).await,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Peer(_) => "peer",
            Self::Block(_) => "block",
        }
    }
}

// ---------------------------------------------------------------------------
// PeerDirectory
// ---------------------------------------------------------------------------

/// Known peers and the transport used to reach them.
pub struct PeerDirectory {
    peers: RwLock<Vec<Node>>,
    client: Arc<dyn NetworkClient>,
    config: PeerDirectoryConfig,
    /// Our own address. Never admitted as a peer.
    local_address: Option<String>,
}

impl PeerDirectory {
    pub fn new(client: Arc<dyn NetworkClient>, config: PeerDirectoryConfig) -> Self {
        Self {
            peers: RwLock::new(Vec::new()),
            client,
            config,
            local_address: None,
        }
    }

    /// Refuse to ever list `address` (our own) as a peer.
    pub fn with_local_address(mut self, address: &str) -> Self {
        self.local_address = Some(normalize_address(address));
        self
    }

    pub fn client(&self) -> &Arc<dyn NetworkClient> {
        &self.client
    }

    /// Snapshot of known peers in discovery order.
    pub fn peers(&self) -> Vec<Node> {
        self.peers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn is_local(&self, address: &str) -> bool {
        self.local_address.as_deref() == Some(normalize_address(address).as_str())
    }

    /// Admit `node`. When it is new and `broadcast` is set, tell every other
    /// known peer about it.
    ///
    /// # Errors
    ///
    /// [`NetworkError::BlankAddress`] if the node has no address. Delivery
    /// failures during the broadcast never surface here.
    pub fn add_peer(&self, node: Node, broadcast: bool) -> NetworkResult<PeerAdmission> {
        if node.has_blank_address() {
            return Err(NetworkError::BlankAddress);
        }
        let node = Node::new(node.address, node.node_type);
        if self.is_local(&node.address) {
            debug!(address = %node.address, "ignoring our own address");
            return Ok(PeerAdmission {
                added: false,
                fan_out: None,
            });
        }

        let targets = {
            let mut peers = self.peers.write();
            if peers.iter().any(|p| p.same_address(&node.address)) {
                return Ok(PeerAdmission {
                    added: false,
                    fan_out: None,
                });
            }
            peers.push(node.clone());
            let targets: Vec<Node> = if broadcast {
                peers
                    .iter()
                    .filter(|p| !p.same_address(&node.address))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            targets
        };

        info!(address = %node.address, node_type = %node.node_type, "added peer");
        let fan_out = broadcast.then(|| self.spawn_fan_out(targets, Payload::Peer(node))).flatten();
        Ok(PeerAdmission {
            added: true,
            fan_out,
        })
    }

    /// Push `block` to every known peer. Fire-and-forget; the handle is
    /// only there for callers that want the tally.
    pub fn broadcast_block(&self, block: &Block) -> Option<JoinHandle<FanOutReport>> {
        let targets = self.peers();
        self.spawn_fan_out(targets, Payload::Block(block.clone()))
    }

    fn spawn_fan_out(&self, targets: Vec<Node>, payload: Payload) -> Option<JoinHandle<FanOutReport>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(kind = payload.describe(), "no async runtime, broadcast skipped");
            return None;
        };
        let client = Arc::clone(&self.client);
        let config = self.config.clone();
        Some(runtime.spawn(fan_out(client, config, targets, payload)))
    }
}

async fn fan_out(
    client: Arc<dyn NetworkClient>,
    config: PeerDirectoryConfig,
    targets: Vec<Node>,
    payload: Payload,
) -> FanOutReport {
    let kind = payload.describe();
    let deadline = config.request_timeout;
    let payload = &payload;
    let client = &client;
    let report = stream::iter(targets)
        .map(|target| async move {
            let delivery = tokio::time::timeout(
                deadline,
                payload.deliver(client.as_ref(), &target.address),
            )
            .await;
            match delivery {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(peer = %target.address, kind, error = %e, "broadcast failed");
                    false
                }
                Err(_) => {
                    warn!(peer = %target.address, kind, "broadcast timed out");
                    false
                }
            }
        })
        .buffer_unordered(config.max_concurrent_broadcasts.max(1))
        .fold(FanOutReport::default(), |mut report, delivered| async move {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
            report
        })
        .await;

    debug!(kind, delivered = report.delivered, failed = report.failed, "fan-out finished");
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
