//! # Ledger: Validation and Minting
//!
//! The [`Ledger`] is the only writer of the chain. Two things grow it:
//!
//! 1. **Minting.** Verified articles collect in a pending buffer. The
//!    submission that brings the buffer to [`MINT_THRESHOLD`] seals the
//!    batch into a block on top of the current tip.
//! 2. **Replication.** A block received from a peer is appended if, and only
//!    if, it extends the current tip correctly.
//!
//! ## Acceptance Rules
//!
//! A block `B` on top of tip `P` is accepted only when:
//!
//! ```text
//! B.height        == P.height + 1
//! B.previousHash  == P.hash
//! B.timestamp     >  P.timestamp
//! B.hash          == SHA-256(B.previousHash ‖ B.timestamp ‖ B.data)
//! ```
//!
//! On an empty chain the only acceptable block is a valid genesis. The hash
//! is always recomputed; a peer's claimed hash is never trusted.
//!
//! ## Locking
//!
//! ```text
//! pending:     Mutex<Vec<Article>>   append → threshold → mint → clear
//! append_lock: Mutex<()>             every write to the store
//! ```
//!
//! Lock order is `pending` then `append_lock`. `process_block` takes only
//! `append_lock`, so a peer block and a local mint can never both extend the
//! same tip.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::article::{Article, ArticleError};
use super::block::Block;
use crate::config::{DEFAULT_PAGE_SIZE, MINT_THRESHOLD};
use crate::crypto::KeyError;
use crate::storage::{BlockStore, SortOrder, StorageError};

// ---------------------------------------------------------------------------
// Errors & Outcomes
// ---------------------------------------------------------------------------

/// Failures that are not a verdict on the input: the ledger itself could
/// not do its job.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error("cannot mint: the chain has no genesis block")]
    MissingGenesis,

    #[error("store is inconsistent: {0}")]
    InconsistentStore(String),

    #[error("failed to encode block payload: {0}")]
    Encoding(String),
}

/// Why a block from a peer was not appended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockRejection {
    #[error("height {height} does not extend tip {tip}")]
    HeightNotAfterTip { height: u64, tip: u64 },

    #[error("height {height} skips ahead of tip {tip}")]
    HeightGap { height: u64, tip: u64 },

    #[error("previous hash does not match the tip")]
    PreviousHashMismatch,

    #[error("timestamp {timestamp} is not after tip timestamp {tip}")]
    TimestampNotIncreasing { timestamp: u64, tip: u64 },

    #[error("claimed hash does not match block content")]
    HashMismatch,

    #[error("first block must be a valid genesis")]
    InvalidGenesis,
}

/// Why an article was not buffered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArticleRejection {
    #[error("malformed article: {0}")]
    Malformed(#[from] ArticleError),

    #[error("undecodable key material: {0}")]
    Undecodable(#[from] KeyError),

    #[error("signature does not verify against the publisher key")]
    BadSignature,
}

/// Result of [`Ledger::process_article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleOutcome {
    /// The article passed verification and was buffered (and possibly
    /// minted straight away).
    pub accepted: bool,
    /// The block this submission sealed, if it hit the threshold.
    pub minted: Option<Block>,
    /// Set whenever `accepted` is false.
    pub rejection: Option<ArticleRejection>,
}

impl ArticleOutcome {
    fn rejected(reason: ArticleRejection) -> Self {
        Self {
            accepted: false,
            minted: None,
            rejection: Some(reason),
        }
    }

    fn buffered() -> Self {
        Self {
            accepted: true,
            minted: None,
            rejection: None,
        }
    }

    fn minted(block: Block) -> Self {
        Self {
            accepted: true,
            minted: Some(block),
            rejection: None,
        }
    }
}

/// Parameters of a paged chain read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainQuery {
    /// Negative pages are legal and simply empty.
    pub page: i64,
    pub size: usize,
    pub sort: SortOrder,
    /// When set, overrides `size` and `sort`: heights `>= from_height`,
    /// newest first, [`DEFAULT_PAGE_SIZE`] per page.
    pub from_height: Option<u64>,
}

impl Default for ChainQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: SortOrder::Asc,
            from_height: None,
        }
    }
}

impl ChainQuery {
    pub fn page(page: i64) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check that `block` may sit directly on top of `tip`.
pub fn validate_successor(tip: &Block, block: &Block) -> Result<(), BlockRejection> {
    let expected = tip.height().saturating_add(1);
    if block.height() < expected {
        return Err(BlockRejection::HeightNotAfterTip {
            height: block.height(),
            tip: tip.height(),
        });
    }
    if block.height() > expected {
        return Err(BlockRejection::HeightGap {
            height: block.height(),
            tip: tip.height(),
        });
    }
    if block.previous_hash() != tip.hash() {
        return Err(BlockRejection::PreviousHashMismatch);
    }
    if block.timestamp() <= tip.timestamp() {
        return Err(BlockRejection::TimestampNotIncreasing {
            timestamp: block.timestamp(),
            tip: tip.timestamp(),
        });
    }
    if !block.has_valid_hash() {
        return Err(BlockRejection::HashMismatch);
    }
    Ok(())
}

/// Check that `block` can start an empty chain.
pub fn validate_genesis(block: &Block) -> Result<(), BlockRejection> {
    if block.is_valid_genesis() {
        Ok(())
    } else {
        Err(BlockRejection::InvalidGenesis)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The chain state machine: storage plus the pending-article buffer.
pub struct Ledger {
    store: Arc<dyn BlockStore>,
    pending: Mutex<Vec<Article>>,
    append_lock: Mutex<()>,
    mint_threshold: usize,
}

impl Ledger {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self::with_mint_threshold(store, MINT_THRESHOLD)
    }

    /// A ledger that mints every `mint_threshold` articles. A threshold of
    /// zero is treated as one.
    pub fn with_mint_threshold(store: Arc<dyn BlockStore>, mint_threshold: usize) -> Self {
        Self {
            store,
            pending: Mutex::new(Vec::with_capacity(mint_threshold)),
            append_lock: Mutex::new(()),
            mint_threshold: mint_threshold.max(1),
        }
    }

    // -- Reads --------------------------------------------------------------

    pub fn get_block(&self, hash: &str) -> Result<Option<Block>, LedgerError> {
        Ok(self.store.get_block(hash)?)
    }

    /// One page of the chain. See [`ChainQuery`].
    pub fn chain(&self, query: ChainQuery) -> Result<Vec<Block>, LedgerError> {
        if query.size == 0 {
            return Err(LedgerError::InvalidPageSize);
        }
        let Ok(page) = usize::try_from(query.page) else {
            return Ok(Vec::new());
        };
        let blocks = match query.from_height {
            Some(from_height) => self.store.blocks_from_height(from_height, page)?,
            None => self.store.blocks(page, query.size, query.sort)?,
        };
        Ok(blocks)
    }

    pub fn latest_block(&self) -> Result<Option<Block>, LedgerError> {
        self.tip()
    }

    pub fn chain_size(&self) -> Result<u64, LedgerError> {
        Ok(self.store.chain_size()?)
    }

    /// Height of the tip, `None` on an empty chain.
    pub fn height(&self) -> Result<Option<u64>, LedgerError> {
        Ok(self.chain_size()?.checked_sub(1))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn mint_threshold(&self) -> usize {
        self.mint_threshold
    }

    // -- Writes -------------------------------------------------------------

    /// Store a fresh genesis block if the chain is empty.
    ///
    /// Returns the block that was stored, or `None` if a chain already
    /// existed.
    pub fn ensure_genesis(&self) -> Result<Option<Block>, LedgerError> {
        let _append = self.append_lock.lock();
        if self.store.chain_size()? > 0 {
            return Ok(None);
        }
        let genesis = Block::genesis();
        self.store.store_block(&genesis)?;
        info!(hash = %genesis.hash(), "stored genesis block");
        Ok(Some(genesis))
    }

    /// Verify an article and buffer it, minting a block at the threshold.
    ///
    /// Rejections (blank fields, bad hex, wrong signature) come back as an
    /// outcome with `accepted == false` and leave the buffer alone. An `Err`
    /// means verification passed but the mint could not be completed; the
    /// article is dropped again so the buffer is exactly as it was.
    pub fn process_article(&self, article: Article) -> Result<ArticleOutcome, LedgerError> {
        if let Err(reason) = verify_article(&article) {
            warn!(headline = %article.headline, %reason, "rejected article");
            return Ok(ArticleOutcome::rejected(reason));
        }

        let mut pending = self.pending.lock();
        pending.push(article);
        if pending.len() < self.mint_threshold {
            debug!(pending = pending.len(), "buffered article");
            return Ok(ArticleOutcome::buffered());
        }

        match self.mint(&pending) {
            Ok(block) => {
                pending.clear();
                Ok(ArticleOutcome::minted(block))
            }
            Err(e) => {
                pending.pop();
                Err(e)
            }
        }
    }

    /// Append a block received from a peer.
    ///
    /// Returns `Ok(false)` when the block breaks a chain rule. Nothing is
    /// written in that case.
    pub fn process_block(&self, block: &Block) -> Result<bool, LedgerError> {
        let _append = self.append_lock.lock();

        let verdict = match self.tip()? {
            Some(tip) => validate_successor(&tip, block),
            None => validate_genesis(block),
        };
        if let Err(reason) = verdict {
            warn!(height = block.height(), hash = %block.hash(), %reason, "rejected block");
            return Ok(false);
        }

        match self.store.store_block(block) {
            Ok(()) => {
                info!(height = block.height(), hash = %block.hash(), "accepted block");
                Ok(true)
            }
            Err(StorageError::HeightTaken(height)) => {
                warn!(height, "rejected block: height already stored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    // -- Internals ----------------------------------------------------------

    /// Seal `batch` on top of the tip. Caller holds the pending lock.
    fn mint(&self, batch: &[Article]) -> Result<Block, LedgerError> {
        let data = serde_json::to_string(batch).map_err(|e| LedgerError::Encoding(e.to_string()))?;

        let _append = self.append_lock.lock();
        let tip = self.tip()?.ok_or(LedgerError::MissingGenesis)?;
        let block = Block::successor(&tip, data);
        self.store.store_block(&block)?;

        info!(
            height = block.height(),
            hash = %block.hash(),
            articles = batch.len(),
            "minted block"
        );
        Ok(block)
    }

    /// Latest block, cross-checked against the reported chain size.
    fn tip(&self) -> Result<Option<Block>, LedgerError> {
        let latest = self.store.latest_block()?;
        let size = self.store.chain_size()?;
        match (latest, size.checked_sub(1)) {
            (None, None) => Ok(None),
            (Some(tip), Some(top)) if tip.height() == top => Ok(Some(tip)),
            (Some(tip), top) => Err(LedgerError::InconsistentStore(format!(
                "latest block has height {} but chain size is {size} (expected tip {top:?})",
                tip.height()
            ))),
            (None, Some(_)) => Err(LedgerError::InconsistentStore(format!(
                "chain size is {size} but there is no latest block"
            ))),
        }
    }
}

fn verify_article(article: &Article) -> Result<(), ArticleRejection> {
    article.validate_fields()?;
    if article.verify_signature()? {
        Ok(())
    } else {
        Err(ArticleRejection::BadSignature)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::ArticleDraft;
    use crate::storage::{MemoryStore, StorageResult};

    fn publisher() -> Keypair {
        Keypair::from_seed(&[21; 32])
    }

    fn article(n: usize) -> Article {
        ArticleDraft {
            byline: format!("Reporter {n}"),
            headline: format!("Headline {n}"),
            section: "World".into(),
            content: format!("Story number {n}."),
            date: "2024-05-17".into(),
        }
        .sign(&publisher())
    }

    fn ledger_with_genesis() -> Ledger {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        ledger.ensure_genesis().unwrap();
        ledger
    }

    // -- Reads --------------------------------------------------------------

    #[test]
    fn test_ensure_genesis_is_idempotent() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        assert!(ledger.ensure_genesis().unwrap().is_some());
        assert!(ledger.ensure_genesis().unwrap().is_none());
        assert_eq!(ledger.chain_size().unwrap(), 1);
        assert_eq!(ledger.height().unwrap(), Some(0));
    }

    #[test]
    fn test_chain_paging_rules() {
        let ledger = ledger_with_genesis();
        for n in 0..MINT_THRESHOLD * 2 {
            ledger.process_article(article(n)).unwrap();
        }
        assert_eq!(ledger.chain_size().unwrap(), 3);

        assert!(ledger.chain(ChainQuery::page(-1)).unwrap().is_empty());
        assert!(matches!(
            ledger.chain(ChainQuery {
                size: 0,
                ..ChainQuery::default()
            }),
            Err(LedgerError::InvalidPageSize)
        ));

        let asc = ledger.chain(ChainQuery::page(0)).unwrap();
        assert_eq!(asc.iter().map(Block::height).collect::<Vec<_>>(), vec![0, 1, 2]);

        let desc = ledger
            .chain(ChainQuery {
                sort: SortOrder::Desc,
                size: 2,
                ..ChainQuery::default()
            })
            .unwrap();
        assert_eq!(desc.iter().map(Block::height).collect::<Vec<_>>(), vec![2, 1]);

        let anchored = ledger
            .chain(ChainQuery {
                from_height: Some(1),
                ..ChainQuery::default()
            })
            .unwrap();
        assert_eq!(anchored.iter().map(Block::height).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_chain_pages_of_five_over_ten_blocks() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let mut tip = Block::genesis_at(1_000);
        assert!(ledger.process_block(&tip).unwrap());
        for i in 1..10u64 {
            tip = Block::successor_at(&tip, format!("[{i}]"), 1_000 + i);
            assert!(ledger.process_block(&tip).unwrap());
        }
        assert_eq!(ledger.chain_size().unwrap(), 10);

        let page = |n: i64| {
            ledger
                .chain(ChainQuery {
                    page: n,
                    size: 5,
                    ..ChainQuery::default()
                })
                .unwrap()
                .iter()
                .map(Block::height)
                .collect::<Vec<_>>()
        };
        assert_eq!(page(0), (0..5).collect::<Vec<u64>>());
        assert_eq!(page(1), (5..10).collect::<Vec<u64>>());
        assert!(page(2).is_empty());
    }

    #[test]
    fn test_get_block_by_hash() {
        let ledger = ledger_with_genesis();
        let genesis = ledger.latest_block().unwrap().unwrap();
        assert_eq!(ledger.get_block(genesis.hash()).unwrap(), Some(genesis));
        assert_eq!(ledger.get_block("absent").unwrap(), None);
    }

    // -- Articles -----------------------------------------------------------

    #[test]
    fn test_valid_article_is_buffered() {
        let ledger = ledger_with_genesis();
        let outcome = ledger.process_article(article(0)).unwrap();
        assert!(outcome.accepted);
        assert!(outcome.minted.is_none());
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn test_tampered_article_is_rejected_without_mutation() {
        let ledger = ledger_with_genesis();
        let mut forged = article(0);
        forged.content = "Something else entirely.".into();

        let outcome = ledger.process_article(forged).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejection, Some(ArticleRejection::BadSignature));
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn test_undecodable_key_is_rejected_not_fatal() {
        let ledger = ledger_with_genesis();
        let mut broken = article(0);
        broken.publisher_key = "zz".into();
        let outcome = ledger.process_article(broken).unwrap();
        assert!(!outcome.accepted);
        assert!(matches!(
            outcome.rejection,
            Some(ArticleRejection::Undecodable(KeyError::InvalidPublicKey))
        ));
    }

    #[test]
    fn test_tenth_article_mints_a_block() {
        let ledger = ledger_with_genesis();
        let genesis = ledger.latest_block().unwrap().unwrap();

        for n in 0..MINT_THRESHOLD - 1 {
            let outcome = ledger.process_article(article(n)).unwrap();
            assert!(outcome.minted.is_none());
        }
        let outcome = ledger.process_article(article(99)).unwrap();
        let block = outcome.minted.expect("threshold should mint");

        assert_eq!(block.height(), 1);
        assert_eq!(block.previous_hash(), genesis.hash());
        assert!(block.timestamp() > genesis.timestamp());
        assert!(block.has_valid_hash());
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(ledger.latest_block().unwrap(), Some(block.clone()));

        let batch: Vec<Article> = serde_json::from_str(block.data()).unwrap();
        assert_eq!(batch.len(), MINT_THRESHOLD);
        assert_eq!(batch.last().unwrap().headline, "Headline 99");
    }

    #[test]
    fn test_mint_without_genesis_leaves_buffer_untouched() {
        let ledger = Ledger::with_mint_threshold(Arc::new(MemoryStore::new()), 2);
        ledger.process_article(article(0)).unwrap();

        let result = ledger.process_article(article(1));
        assert!(matches!(result, Err(LedgerError::MissingGenesis)));
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.chain_size().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_submissions_mint_one_block_per_threshold() {
        let ledger = Arc::new(ledger_with_genesis());
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut minted = 0;
                    for n in 0..MINT_THRESHOLD * 5 {
                        let outcome = ledger.process_article(article(t * 1000 + n)).unwrap();
                        minted += usize::from(outcome.minted.is_some());
                    }
                    minted
                })
            })
            .collect();

        let minted: usize = threads.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(minted, 4 * 5);
        assert_eq!(ledger.chain_size().unwrap(), 1 + 4 * 5);
        assert_eq!(ledger.pending_count(), 0);

        let chain = ledger
            .chain(ChainQuery {
                size: 100,
                ..ChainQuery::default()
            })
            .unwrap();
        for pair in chain.windows(2) {
            assert!(validate_successor(&pair[0], &pair[1]).is_ok());
        }
    }

    // -- Blocks -------------------------------------------------------------

    #[test]
    fn test_empty_chain_accepts_only_genesis() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let not_genesis = Block::new("", "payload", 1, 0);
        assert!(!ledger.process_block(&not_genesis).unwrap());

        let genesis = Block::genesis_at(1);
        assert!(ledger.process_block(&genesis).unwrap());
        assert_eq!(ledger.chain_size().unwrap(), 1);
    }

    #[test]
    fn test_valid_successor_is_accepted() {
        let ledger = ledger_with_genesis();
        let tip = ledger.latest_block().unwrap().unwrap();
        let next = Block::successor_at(&tip, "[]", tip.timestamp() + 10);
        assert!(ledger.process_block(&next).unwrap());
        assert_eq!(ledger.latest_block().unwrap(), Some(next));
    }

    #[test]
    fn test_block_rule_violations() {
        let tip = Block::genesis_at(1_000);
        let good = Block::successor_at(&tip, "[]", 2_000);
        assert_eq!(validate_successor(&tip, &good), Ok(()));

        let stale = Block::new(tip.hash(), "[]", 2_000, 0);
        assert!(matches!(
            validate_successor(&tip, &stale),
            Err(BlockRejection::HeightNotAfterTip { .. })
        ));

        let gap = Block::new(tip.hash(), "[]", 2_000, 2);
        assert!(matches!(
            validate_successor(&tip, &gap),
            Err(BlockRejection::HeightGap { .. })
        ));

        let unlinked = Block::new("f00d", "[]", 2_000, 1);
        assert_eq!(
            validate_successor(&tip, &unlinked),
            Err(BlockRejection::PreviousHashMismatch)
        );

        let same_time = Block::new(tip.hash(), "[]", 1_000, 1);
        assert!(matches!(
            validate_successor(&tip, &same_time),
            Err(BlockRejection::TimestampNotIncreasing { .. })
        ));

        let forged = Block::from_parts(tip.hash(), "[\"forged\"]", 2_000, 1, good.hash());
        assert_eq!(
            validate_successor(&tip, &forged),
            Err(BlockRejection::HashMismatch)
        );
    }

    #[test]
    fn test_rejected_block_is_not_persisted() {
        let ledger = ledger_with_genesis();
        let tip = ledger.latest_block().unwrap().unwrap();
        let forged = Block::from_parts(tip.hash(), "x", tip.timestamp() + 1, 1, "00");
        assert!(!ledger.process_block(&forged).unwrap());
        assert_eq!(ledger.chain_size().unwrap(), 1);
    }

    // -- Store consistency --------------------------------------------------

    struct LyingStore;

    impl BlockStore for LyingStore {
        fn store_block(&self, _block: &Block) -> StorageResult<()> {
            Ok(())
        }
        fn get_block(&self, _hash: &str) -> StorageResult<Option<Block>> {
            Ok(None)
        }
        fn latest_block(&self) -> StorageResult<Option<Block>> {
            Ok(Some(Block::genesis_at(1)))
        }
        fn chain_size(&self) -> StorageResult<u64> {
            Ok(0)
        }
        fn blocks(&self, _page: usize, _size: usize, _sort: SortOrder) -> StorageResult<Vec<Block>> {
            Ok(Vec::new())
        }
        fn blocks_from_height(&self, _from: u64, _page: usize) -> StorageResult<Vec<Block>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_inconsistent_store_is_an_error() {
        let ledger = Ledger::new(Arc::new(LyingStore));
        assert!(matches!(
            ledger.latest_block(),
            Err(LedgerError::InconsistentStore(_))
        ));
        assert!(matches!(
            ledger.process_block(&Block::genesis_at(5)),
            Err(LedgerError::InconsistentStore(_))
        ));
    }
}
