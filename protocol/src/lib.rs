// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gray Matter Core Library
//!
//! Gray Matter is a small news ledger: every node keeps an append-only,
//! hash-linked chain of blocks, and every block carries a batch of signed
//! articles. There is no mining and no voting. A node accepts a block when it
//! passes local validation, and publishers sign what they write so any node
//! can check the byline really came from the key that claims it.
//!
//! ## Architecture
//!
//! - **crypto**: SHA-256 hashing and Ed25519 keys/signatures.
//! - **storage**: The block storage contract plus in-memory and sled-backed
//!   implementations.
//! - **ledger**: Blocks, articles, and the validate-and-mint state machine.
//! - **network**: Peer directory, gossip fan-out, the transport contract,
//!   and the donor bootstrap sequence.
//! - **config**: Protocol constants.
//!
//! ## Ground rules
//!
//! 1. A block that fails validation is rejected, logged, and forgotten. It
//!    never reaches storage.
//! 2. Peer-supplied hashes are recomputed, never trusted.
//! 3. Broadcasts are best effort. A dead peer never fails the caller.

pub mod config;
pub mod crypto;
pub mod ledger;
pub mod network;
pub mod storage;
