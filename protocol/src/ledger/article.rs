//! # Articles
//!
//! An article is a signed news item waiting to be minted into a block.
//!
//! The publisher signs [`article_signing_payload`] over the five content
//! fields with the secret half of `publisher_key`. The article's id is the
//! SHA-256 of the publisher key followed by the same five fields, so two
//! publishers filing identical copy still get distinct ids.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::sha256_hex_concat;
use crate::crypto::keys::{KeyError, Keypair, PublicKey, Signature};
use crate::crypto::signatures::article_signing_payload;

/// Why an article was refused before its signature was even looked at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArticleError {
    #[error("field `{0}` must not be blank")]
    BlankField(&'static str),

    #[error("date `{0}` is not an ISO YYYY-MM-DD date")]
    InvalidDate(String),
}

/// A signed news article. Wire format is camelCase JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Hex-encoded Ed25519 public key of the publisher.
    pub publisher_key: String,
    pub byline: String,
    pub headline: String,
    pub section: String,
    pub content: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    /// Hex-encoded signature over the content fields.
    pub signature: String,
}

impl Article {
    /// Content-derived identifier.
    pub fn id(&self) -> String {
        sha256_hex_concat(&[
            &self.publisher_key,
            &self.byline,
            &self.headline,
            &self.section,
            &self.content,
            &self.date,
        ])
    }

    /// The exact bytes the publisher signed.
    pub fn signing_payload(&self) -> Vec<u8> {
        article_signing_payload(
            &self.byline,
            &self.headline,
            &self.section,
            &self.content,
            &self.date,
        )
    }

    /// Structural checks: every field present, date well-formed.
    pub fn validate_fields(&self) -> Result<(), ArticleError> {
        let fields = [
            ("publisherKey", &self.publisher_key),
            ("byline", &self.byline),
            ("headline", &self.headline),
            ("section", &self.section),
            ("content", &self.content),
            ("date", &self.date),
            ("signature", &self.signature),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ArticleError::BlankField(name));
            }
        }
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| ArticleError::InvalidDate(self.date.clone()))?;
        Ok(())
    }

    /// Check the signature against the declared publisher key.
    ///
    /// # Errors
    ///
    /// A key or signature that does not decode is an error. A well-formed
    /// signature by somebody else is `Ok(false)`.
    pub fn verify_signature(&self) -> Result<bool, KeyError> {
        let publisher = PublicKey::from_hex(&self.publisher_key)?;
        let signature = Signature::from_hex(&self.signature)?;
        Ok(publisher.verify(&self.signing_payload(), &signature))
    }
}

/// An unsigned article. Publishers fill this in and call [`ArticleDraft::sign`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub byline: String,
    pub headline: String,
    pub section: String,
    pub content: String,
    pub date: String,
}

impl ArticleDraft {
    pub fn sign(self, publisher: &Keypair) -> Article {
        let payload = article_signing_payload(
            &self.byline,
            &self.headline,
            &self.section,
            &self.content,
            &self.date,
        );
        Article {
            publisher_key: publisher.public_key().to_hex(),
            signature: publisher.sign(&payload).to_hex(),
            byline: self.byline,
            headline: self.headline,
            section: self.section,
            content: self.content,
            date: self.date,
        }
    }
}
