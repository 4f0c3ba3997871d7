//! # Hashing Utilities
//!
//! Gray Matter uses exactly one hash function: SHA-256. Block hashes, article
//! IDs, and anything else that needs a digest go through here, and every
//! digest that crosses the wire is lowercase hex.
//!
//! The hash is computed by the pure-Rust `sha2` crate, so there is no
//! "algorithm unavailable" path at runtime and no platform-dependent output.
//! If it compiles, it hashes, and it hashes the same bytes the same way on
//! every node.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use graymatter_protocol::crypto::hash::sha256;
///
/// let digest = sha256(b"gray matter");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 hash of the input and return it as lowercase hex.
///
/// This is the digest format used on the wire and in storage. 64 characters,
/// no prefix.
///
/// # Example
///
/// ```
/// use graymatter_protocol::crypto::sha256_hex;
///
/// let digest = sha256_hex(b"gray matter");
/// assert_eq!(digest.len(), 64);
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash several string parts as if they had been concatenated first.
///
/// The parts are fed to the hasher in order with no separator, which is
/// exactly the preimage layout blocks and articles use. Saves building the
/// concatenated string just to throw it away.
pub fn sha256_hex_concat(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // NIST test vector for "abc".
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_deterministic() {
        assert_eq!(sha256(b"same input"), sha256(b"same input"));
        assert_ne!(sha256(b"input a"), sha256(b"input b"));
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = sha256_hex(b"previous1700000000000payload");
        let parts = sha256_hex_concat(&["previous", "1700000000000", "payload"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_hex_output_is_lowercase() {
        let digest = sha256_hex(b"case check");
        assert!(digest.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
