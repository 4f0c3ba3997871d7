//! # Digital Signatures
//!
//! Signing and verification for published articles.
//!
//! ## The canonical payload
//!
//! A publisher signs `byline ‖ headline ‖ section ‖ content ‖ date`, plain
//! UTF-8 concatenation with no separators, in exactly that order. Every
//! verifying node rebuilds the same byte string with
//! [`article_signing_payload`]. Change the order on one side and every
//! article from that publisher stops verifying, so this function is the only
//! place the layout is written down.
//!
//! ## String-level helpers
//!
//! Keys and signatures arrive as hex strings inside JSON. [`sign_hex`] and
//! [`verify_hex`] do the decoding and report bad input as a [`KeyError`],
//! keeping "this hex is garbage" separate from "this signature is wrong".

use super::keys::{KeyError, Keypair, PublicKey, Signature};

/// Build the canonical byte payload a publisher signs for an article.
pub fn article_signing_payload(
    byline: &str,
    headline: &str,
    section: &str,
    content: &str,
    date: &str,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(
        byline.len() + headline.len() + section.len() + content.len() + date.len(),
    );
    payload.extend_from_slice(byline.as_bytes());
    payload.extend_from_slice(headline.as_bytes());
    payload.extend_from_slice(section.as_bytes());
    payload.extend_from_slice(content.as_bytes());
    payload.extend_from_slice(date.as_bytes());
    payload
}

/// Sign a message with a keypair.
///
/// # Example
///
/// ```
/// use graymatter_protocol::crypto::{sign, verify, Keypair};
///
/// let keypair = Keypair::generate().unwrap();
/// let signature = sign(&keypair, b"extra! extra!");
/// assert!(verify(&keypair.public_key(), b"extra! extra!", &signature));
/// ```
pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature against a public key and message.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Sign `data` with a hex-encoded secret key and return the hex signature.
///
/// # Errors
///
/// Returns [`KeyError::InvalidSecretKey`] if the key does not decode.
pub fn sign_hex(secret_key_hex: &str, data: &[u8]) -> Result<String, KeyError> {
    let keypair = Keypair::from_hex(secret_key_hex)?;
    Ok(sign(&keypair, data).to_hex())
}

/// Verify a hex-encoded signature with a hex-encoded public key.
///
/// # Errors
///
/// Decode failures are errors. A well-formed signature that simply does not
/// match is `Ok(false)`.
pub fn verify_hex(public_key_hex: &str, data: &[u8], signature_hex: &str) -> Result<bool, KeyError> {
    let public_key = PublicKey::from_hex(public_key_hex)?;
    let signature = Signature::from_hex(signature_hex)?;
    Ok(verify(&public_key, data, &signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = keypair(1);
        let sig = sign(&kp, b"hello, world");
        assert!(verify(&kp.public_key(), b"hello, world", &sig));
    }

    #[test]
    fn test_wrong_message_fails() {
        let kp = keypair(1);
        let sig = sign(&kp, b"correct message");
        assert!(!verify(&kp.public_key(), b"wrong message", &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = keypair(1);
        let kp2 = keypair(2);
        let sig = sign(&kp1, b"test message");
        assert!(!verify(&kp2.public_key(), b"test message", &sig));
    }

    #[test]
    fn test_deterministic_signatures() {
        let kp = keypair(4);
        assert_eq!(sign(&kp, b"same"), sign(&kp, b"same"));
    }

    #[test]
    fn test_payload_field_order() {
        let payload = article_signing_payload("by", "head", "sec", "body", "2024-01-01");
        assert_eq!(payload, b"byheadsecbody2024-01-01".to_vec());
    }

    #[test]
    fn test_payload_order_is_part_of_the_contract() {
        // Swapping two fields must change what gets signed.
        let kp = keypair(5);
        let payload = article_signing_payload("alice", "headline", "world", "text", "2024-01-01");
        let swapped = article_signing_payload("headline", "alice", "world", "text", "2024-01-01");
        let sig = sign(&kp, &payload);
        assert!(verify(&kp.public_key(), &payload, &sig));
        assert!(!verify(&kp.public_key(), &swapped, &sig));
    }

    #[test]
    fn test_hex_helpers_roundtrip() {
        let kp = keypair(6);
        let sig_hex = sign_hex(&kp.secret_key_hex(), b"data").expect("sign");
        assert!(verify_hex(&kp.public_key().to_hex(), b"data", &sig_hex).expect("verify"));
        assert!(!verify_hex(&kp.public_key().to_hex(), b"other", &sig_hex).expect("verify"));
    }

    #[test]
    fn test_hex_helpers_surface_decode_errors() {
        assert!(matches!(
            sign_hex("nope", b"data"),
            Err(KeyError::InvalidSecretKey)
        ));
        let kp = keypair(7);
        assert!(matches!(
            verify_hex(&kp.public_key().to_hex(), b"data", "xyz"),
            Err(KeyError::InvalidSignature)
        ));
        assert!(matches!(
            verify_hex("xyz", b"data", &"00".repeat(64)),
            Err(KeyError::InvalidPublicKey)
        ));
    }
}
