//! # Block Structure
//!
//! A block is the unit of replication in Gray Matter: a batch of minted
//! articles plus the link that chains it to its predecessor.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  previousHash: String   (hex, "" for genesis)    │
//! │  data:         String   (JSON array of articles) │
//! │  timestamp:    u64      (Unix milliseconds)      │
//! │  height:       u64      (genesis = 0)            │
//! │  hash:         String   (hex SHA-256)            │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! `hash = SHA-256(previousHash ‖ decimal(timestamp) ‖ data)`, hex-encoded.
//! The height is not part of the preimage; it is pinned instead by the
//! `height == predecessor.height + 1` rule the ledger enforces.
//!
//! Blocks are immutable. Fields are private and only readable through
//! accessors, so the only ways to get a `Block` are the constructors below
//! or deserialization, and a deserialized block is untrusted until
//! [`Block::has_valid_hash`] says otherwise.

use serde::{Deserialize, Serialize};

use crate::config::GENESIS_DATA;
use crate::crypto::hash::sha256_hex_concat;

/// A block in the chain. Wire format is camelCase JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    previous_hash: String,
    data: String,
    timestamp: u64,
    height: u64,
    hash: String,
}

impl Block {
    /// Construct a block and compute its hash from the content.
    pub fn new(previous_hash: impl Into<String>, data: impl Into<String>, timestamp: u64, height: u64) -> Self {
        let previous_hash = previous_hash.into();
        let data = data.into();
        let hash = compute_block_hash(&previous_hash, timestamp, &data);
        Self {
            previous_hash,
            data,
            timestamp,
            height,
            hash,
        }
    }

    /// Reassemble a block from all five fields, including a claimed hash.
    ///
    /// Nothing is checked here. This is how storage rehydrates rows and how
    /// tests build deliberately broken blocks.
    pub fn from_parts(
        previous_hash: impl Into<String>,
        data: impl Into<String>,
        timestamp: u64,
        height: u64,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            previous_hash: previous_hash.into(),
            data: data.into(),
            timestamp,
            height,
            hash: hash.into(),
        }
    }

    /// Construct the genesis block stamped with the current time.
    pub fn genesis() -> Self {
        Self::genesis_at(now_millis())
    }

    /// Construct the genesis block with an explicit timestamp.
    pub fn genesis_at(timestamp: u64) -> Self {
        Self::new("", GENESIS_DATA, timestamp, 0)
    }

    /// Build the successor of `parent` carrying `data`.
    ///
    /// The timestamp is `max(now, parent.timestamp + 1)`, so a child is
    /// always strictly newer than its parent even when the wall clock has
    /// not moved (or has moved backwards).
    pub fn successor(parent: &Block, data: impl Into<String>) -> Self {
        Self::successor_at(parent, data, now_millis())
    }

    /// [`Block::successor`] with an injected clock reading.
    pub fn successor_at(parent: &Block, data: impl Into<String>, now: u64) -> Self {
        let timestamp = now.max(parent.timestamp.saturating_add(1));
        Self::new(
            parent.hash.clone(),
            data,
            timestamp,
            parent.height.saturating_add(1),
        )
    }

    /// Recompute the hash from `(previous_hash, timestamp, data)`.
    pub fn compute_hash(&self) -> String {
        compute_block_hash(&self.previous_hash, self.timestamp, &self.data)
    }

    /// Whether the claimed hash matches the content.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Whether this block has the shape of a genesis block: height 0, no
    /// predecessor, the agreed genesis payload, and a hash that matches.
    pub fn is_valid_genesis(&self) -> bool {
        self.height == 0
            && self.previous_hash.is_empty()
            && self.data == GENESIS_DATA
            && self.has_valid_hash()
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// `SHA-256(previous_hash ‖ decimal(timestamp) ‖ data)` as lowercase hex.
pub fn compute_block_hash(previous_hash: &str, timestamp: u64, data: &str) -> String {
    sha256_hex_concat(&[previous_hash, &timestamp.to_string(), data])
}

/// Current wall-clock time in Unix milliseconds.
///
/// A clock set before 1970 reads as zero rather than panicking; the
/// successor rule keeps timestamps monotonic regardless.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
