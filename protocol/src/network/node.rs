//! Node identity: who a peer is and what it is allowed to do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The role a node plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Accepts signed articles and mints blocks.
    Publisher,
    /// Holds a copy of the chain. Never authors.
    Replica,
    /// Serves only the crypto helpers. Holds no chain.
    Utility,
}

impl NodeType {
    /// Whether nodes of this type accept `POST /article`.
    pub fn can_author(self) -> bool {
        matches!(self, Self::Publisher)
    }

    /// Whether nodes of this type keep a chain and take part in replication.
    pub fn holds_chain(self) -> bool {
        !matches!(self, Self::Utility)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publisher => "PUBLISHER",
            Self::Replica => "REPLICA",
            Self::Utility => "UTILITY",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLISHER" => Ok(Self::Publisher),
            "REPLICA" => Ok(Self::Replica),
            "UTILITY" => Ok(Self::Utility),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// A member of the network, identified by its base URL.
///
/// Two `Node`s with the same address are the same peer regardless of type;
/// the peer directory deduplicates on `address` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Base URL, e.g. `http://10.0.0.5:8080`. No trailing slash.
    pub address: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

impl Node {
    pub fn new(address: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            address: normalize_address(&address.into()),
            node_type,
        }
    }

    pub fn has_blank_address(&self) -> bool {
        self.address.trim().is_empty()
    }

    /// Same peer as `other`, ignoring a trailing slash.
    pub fn same_address(&self, other: &str) -> bool {
        normalize_address(&self.address) == normalize_address(other)
    }
}

/// Trim whitespace and any trailing `/` so URLs compare and join cleanly.
pub fn normalize_address(address: &str) -> String {
    address.trim().trim_end_matches('/').to_string()
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: Node,
}

/// Body of `GET /network`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<Node>,
}
