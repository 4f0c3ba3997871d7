//! # Network Module
//!
//! Peer membership and chain replication for Gray Matter nodes.
//!
//! ## Architecture
//!
//! ```text
//! node.rs      Node, NodeType, and the /status and /network bodies
//! client.rs    NetworkClient transport trait and its reqwest implementation
//! peers.rs     PeerDirectory: deduplicated peer set and broadcast fan-out
//! bootstrap.rs joining the network through a donor node
//! ```
//!
//! ## Design Decisions
//!
//! - Propagation is a plain flood. A node that learns of a new peer (with
//!   `broadcast=true`) tells every other peer it knows, once. A node that
//!   mints a block pushes it to every peer, once. There is no gossip TTL and
//!   no retry; a peer that misses a block catches up on its next bootstrap.
//! - The peer set is a `parking_lot::RwLock<Vec<Node>>`. Reads (listing
//!   peers, snapshotting broadcast targets) dominate, and every critical
//!   section is a short scan with no `.await` inside.
//! - The protocol crate owns the transport trait, not the HTTP server. The
//!   routes the client targets are served by the node binary via axum.

pub mod bootstrap;
pub mod client;
pub mod node;
pub mod peers;

pub use bootstrap::{bootstrap, BootstrapError, BootstrapReport};
pub use client::{HttpNetworkClient, NetworkClient, NetworkError, NetworkResult};
pub use node::{normalize_address, Node, NodeInfo, NodeType, PeerList};
pub use peers::{FanOutReport, PeerAdmission, PeerDirectory, PeerDirectoryConfig};
