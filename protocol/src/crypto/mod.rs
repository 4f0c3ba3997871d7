//! # Cryptographic Primitives for Gray Matter
//!
//! Two jobs live here: hashing blocks and articles, and proving that an
//! article was written by the holder of a publisher key.
//!
//! - **SHA-256** for every digest (block hashes, article IDs).
//! - **Ed25519** for publisher signatures.
//!
//! Everything is a thin wrapper around audited crates (`sha2`,
//! `ed25519-dalek`). The wrappers exist to pin down encodings and give the
//! rest of the crate one error type for bad key material.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{sha256, sha256_hex, sha256_hex_concat};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{article_signing_payload, sign, sign_hex, verify, verify_hex};
