//! # Protocol Configuration & Constants
//!
//! Every magic number in Gray Matter lives here. Nodes that disagree on these
//! values will reject each other's blocks, so treat a change to anything in
//! the "Chain Parameters" section as a network-wide upgrade.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The protocol version string reported by `graymatter-node version`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Chain Parameters
// ---------------------------------------------------------------------------

/// Number of pending articles that triggers minting a new block.
pub const MINT_THRESHOLD: usize = 10;

/// Payload carried by the genesis block. Every node agrees on it, which is
/// what lets a replica accept a donor's genesis without a predecessor.
pub const GENESIS_DATA: &str = "Genesis";

/// Page size used when a chain read does not specify one, and the fixed page
/// size for height-anchored reads.
pub const DEFAULT_PAGE_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Publisher signatures are Ed25519.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Timeout applied to every outbound call to a peer. A peer that does not
/// answer within this window counts as a failed delivery.
pub const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on concurrent outbound calls in a single broadcast fan-out.
pub const MAX_CONCURRENT_BROADCASTS: usize = 16;
