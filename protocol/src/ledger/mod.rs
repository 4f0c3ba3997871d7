//! # Ledger Module
//!
//! Blocks, articles, and the state machine that decides which of them make
//! it onto the chain.
//!
//! ```text
//! block.rs   Block, genesis, hash computation
//! article.rs Article, ArticleDraft, field checks and signature verification
//! chain.rs   Ledger: pending buffer, minting, peer block validation
//! ```

pub mod article;
pub mod block;
pub mod chain;

pub use article::{Article, ArticleDraft, ArticleError};
pub use block::{compute_block_hash, now_millis, Block};
pub use chain::{
    validate_genesis, validate_successor, ArticleOutcome, ArticleRejection, BlockRejection,
    ChainQuery, Ledger, LedgerError,
};
