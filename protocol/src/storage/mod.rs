//! # Storage Module
//!
//! The chain lives behind the [`BlockStore`] trait. The ledger owns the
//! rules (what may be appended, and when); a store only has to keep blocks
//! in height order and answer reads.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs    BlockStore contract, SortOrder, StorageError
//! memory.rs MemoryStore: RwLock'd vector, for tests and ephemeral nodes
//! db.rs     SledStore: sled-backed persistence across restarts
//! ```
//!
//! ## Contract
//!
//! - Heights are dense: the block at index `i` has height `i`.
//! - `store_block` refuses a height that is already taken. The ledger never
//!   asks for that (it validates first, under its append lock), but a store
//!   must not silently overwrite history if it happens anyway.
//! - Reads may run concurrently with each other and with a write.
//!
//! Bincode is the on-disk encoding. JSON is for the wire; storage wants
//! compact and deterministic.

pub mod db;
pub mod memory;

pub use db::SledStore;
pub use memory::MemoryStore;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::ledger::Block;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors raised by a [`BlockStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("height {0} is already taken")]
    HeightTaken(u64),

    #[error("height {height} would leave a gap after {size} stored blocks")]
    HeightGap { height: u64, size: u64 },
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Sort Order
// ---------------------------------------------------------------------------

/// Height ordering for paged chain reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// BlockStore
// ---------------------------------------------------------------------------

/// Where the chain is kept.
///
/// Implementations are shared behind an `Arc` between the HTTP handlers and
/// the ledger, hence `Send + Sync` and `&self` everywhere.
pub trait BlockStore: Send + Sync {
    /// Append `block` at its height. The height must equal the current size.
    fn store_block(&self, block: &Block) -> StorageResult<()>;

    /// Look a block up by hash.
    fn get_block(&self, hash: &str) -> StorageResult<Option<Block>>;

    /// The block with the greatest height, if any.
    fn latest_block(&self) -> StorageResult<Option<Block>>;

    /// Number of stored blocks. With dense heights, also `tip height + 1`.
    fn chain_size(&self) -> StorageResult<u64>;

    /// One page of the chain in the requested order. `size` is never zero
    /// here; the ledger rejects that before asking.
    fn blocks(&self, page: usize, size: usize, sort: SortOrder) -> StorageResult<Vec<Block>>;

    /// Blocks with `height >= from_height`, newest first, in pages of
    /// [`DEFAULT_PAGE_SIZE`].
    fn blocks_from_height(&self, from_height: u64, page: usize) -> StorageResult<Vec<Block>>;
}

/// The inclusive-exclusive height window `[start, end)` covering `page` in
/// the given order, or `None` when the page lies past the end of the chain.
///
/// Shared by both stores so they agree on paging to the block.
pub(crate) fn page_window(
    chain_size: u64,
    page: usize,
    size: usize,
    sort: SortOrder,
) -> Option<(u64, u64)> {
    let size = size as u64;
    let skip = (page as u64).checked_mul(size)?;
    if skip >= chain_size {
        return None;
    }
    match sort {
        SortOrder::Asc => Some((skip, skip.saturating_add(size).min(chain_size))),
        SortOrder::Desc => {
            let end = chain_size - skip;
            Some((end.saturating_sub(size), end))
        }
    }
}

/// Height window for [`BlockStore::blocks_from_height`]: newest first, down
/// to and including `from_height`.
pub(crate) fn from_height_window(chain_size: u64, from_height: u64, page: usize) -> Option<(u64, u64)> {
    if from_height >= chain_size {
        return None;
    }
    let (start, end) = page_window(chain_size - from_height, page, DEFAULT_PAGE_SIZE, SortOrder::Desc)?;
    Some((start + from_height, end + from_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("ASC".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert_eq!("desc".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert!("sideways".parse::<SortOrder>().is_err());
        assert_eq!(SortOrder::default(), SortOrder::Asc);
    }

    #[test]
    fn test_page_window_ascending() {
        assert_eq!(page_window(25, 0, 10, SortOrder::Asc), Some((0, 10)));
        assert_eq!(page_window(25, 2, 10, SortOrder::Asc), Some((20, 25)));
        assert_eq!(page_window(25, 3, 10, SortOrder::Asc), None);
    }

    #[test]
    fn test_page_window_descending() {
        assert_eq!(page_window(25, 0, 10, SortOrder::Desc), Some((15, 25)));
        assert_eq!(page_window(25, 2, 10, SortOrder::Desc), Some((0, 5)));
        assert_eq!(page_window(25, 3, 10, SortOrder::Desc), None);
    }

    #[test]
    fn test_page_window_huge_page_does_not_overflow() {
        assert_eq!(page_window(5, usize::MAX, 10, SortOrder::Asc), None);
    }

    #[test]
    fn test_from_height_window() {
        // Heights 0..=24, anchored at 5: 24..=15, then 14..=5, then nothing.
        assert_eq!(from_height_window(25, 5, 0), Some((15, 25)));
        assert_eq!(from_height_window(25, 5, 1), Some((5, 15)));
        assert_eq!(from_height_window(25, 5, 2), None);
        assert_eq!(from_height_window(25, 25, 0), None);
    }
}
