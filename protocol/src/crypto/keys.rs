//! # Key Management
//!
//! Ed25519 keypair generation and the hex encodings publishers use to move
//! keys and signatures through JSON payloads.
//!
//! ## Encoding
//!
//! Everything that leaves a process is lowercase hex:
//!
//! | Material    | Raw bytes | Hex chars |
//! |-------------|-----------|-----------|
//! | secret key  | 32        | 64        |
//! | public key  | 32        | 64        |
//! | signature   | 64        | 128       |
//!
//! Decoding never panics. Bad hex, wrong lengths, and points that are not on
//! the curve all come back as a [`KeyError`] the caller can turn into a 400.
//!
//! ## Security considerations
//!
//! - Secret keys are seeded from the OS RNG. If the RNG cannot be read, key
//!   generation fails loudly with [`KeyError::Generation`] instead of handing
//!   back a weak key.
//! - Secret key bytes are never logged. `Debug` for [`Keypair`] prints only
//!   the public half.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, SIGNING_KEY_LENGTH, VERIFYING_KEY_LENGTH};

/// Errors that can occur during key operations.
///
/// These are intentionally vague about *why* decoding failed. The caller
/// only needs to know which piece of input was bad.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("invalid secret key: expected 32 hex-encoded bytes")]
    InvalidSecretKey,

    #[error("invalid public key: not a hex-encoded Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature: expected 64 hex-encoded bytes")]
    InvalidSignature,

    #[error("keypair mismatch: public key does not belong to the secret key")]
    KeypairMismatch,
}

/// An Ed25519 signing keypair.
///
/// Deliberately not `Serialize`. Exporting a secret key should be a visible
/// call to [`Keypair::secret_key_hex`], not a side effect of putting a struct
/// into a JSON response.
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of a publisher identity.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

/// An Ed25519 signature. Always exactly 64 bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_LENGTH],
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

impl Keypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Generation`] if the OS RNG cannot be read.
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; SIGNING_KEY_LENGTH];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the seed *is* the secret key. Handy for tests and for
    /// loading keys from configuration.
    pub fn from_seed(seed: &[u8; SIGNING_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SIGNING_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Sign a message.
    ///
    /// Ed25519 signing is deterministic: the same key and message always
    /// produce the same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Export the secret key as hex. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Check that `public_key` is the public half of this keypair.
    ///
    /// Used at startup to make sure a publisher was not configured with keys
    /// from two different identities.
    pub fn ensure_matches(&self, public_key: &PublicKey) -> Result<(), KeyError> {
        if self.public_key() == *public_key {
            Ok(())
        } else {
            Err(KeyError::KeypairMismatch)
        }
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Parse a hex-encoded public key.
    ///
    /// Rejects malformed hex, wrong lengths, and byte strings that do not
    /// decode to a curve point.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
        let arr: [u8; VERIFYING_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        let verifying_key =
            VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    /// Hex-encoded representation. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    /// Verify a signature against this public key.
    ///
    /// Returns a plain boolean: callers want yes or no, and telling an
    /// attacker which check failed buys nothing.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let dalek_sig = DalekSignature::from_bytes(&signature.bytes);
        self.verifying_key.verify(message, &dalek_sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidSignature)?;
        let arr: [u8; SIGNATURE_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes: arr })
    }

    /// Hex-encoded representation. 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = Keypair::generate().expect("keygen");
        let b = Keypair::generate().expect("keygen");
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_secret_key_hex_roundtrip() {
        let kp = Keypair::generate().expect("keygen");
        let restored = Keypair::from_hex(&kp.secret_key_hex()).expect("decode");
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let hex_str = kp.public_key().to_hex();
        assert_eq!(hex_str.len(), 64);
        let parsed = PublicKey::from_hex(&hex_str).expect("decode");
        assert_eq!(parsed, kp.public_key());
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let kp = Keypair::from_seed(&[9u8; 32]);
        let sig = kp.sign(b"headline");
        let parsed = Signature::from_hex(&sig.to_hex()).expect("decode");
        assert_eq!(parsed, sig);
    }

    #[test]
    fn test_bad_secret_key_hex_is_recoverable() {
        assert!(matches!(
            Keypair::from_hex("not hex at all"),
            Err(KeyError::InvalidSecretKey)
        ));
        assert!(matches!(
            Keypair::from_hex("abcd"),
            Err(KeyError::InvalidSecretKey)
        ));
    }

    #[test]
    fn test_bad_public_key_hex_is_recoverable() {
        assert!(matches!(
            PublicKey::from_hex("zz"),
            Err(KeyError::InvalidPublicKey)
        ));
        assert!(matches!(
            PublicKey::from_hex(&"ab".repeat(31)),
            Err(KeyError::InvalidPublicKey)
        ));
    }

    #[test]
    fn test_bad_signature_hex_is_recoverable() {
        assert!(matches!(
            Signature::from_hex(&"00".repeat(63)),
            Err(KeyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_ensure_matches() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let other = Keypair::from_seed(&[2u8; 32]);
        assert!(kp.ensure_matches(&kp.public_key()).is_ok());
        assert!(matches!(
            kp.ensure_matches(&other.public_key()),
            Err(KeyError::KeypairMismatch)
        ));
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&kp.secret_key_hex()));
    }
}
