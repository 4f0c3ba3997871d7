//! # SledStore: Persistent Chain Storage
//!
//! The on-disk [`BlockStore`], built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                 | Value              |
//! |----------------|---------------------|--------------------|
//! | `blocks`       | `height` (8B BE)    | `bincode(Block)`   |
//! | `block_hashes` | `hash` (hex, UTF-8) | `height` (8B BE)   |
//!
//! Heights are stored big-endian so sled's lexicographic ordering matches
//! numeric ordering. That makes `blocks.last()` the tip and range scans
//! return blocks in height order, so there is no separate "latest height"
//! record to keep in sync.
//!
//! ## Write Path
//!
//! The block row is written with a compare-and-swap against "absent", which
//! is what turns a second write at the same height into
//! [`StorageError::HeightTaken`] instead of an overwrite. The hash index is
//! written after the row and the database is flushed before returning.

use sled::{Db, Tree};
use std::path::Path;

use super::{from_height_window, page_window, BlockStore, SortOrder, StorageError, StorageResult};
use crate::ledger::Block;

/// Persistent block storage backed by sled.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// a `SledStore` can be shared through an `Arc` without extra locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    /// Blocks indexed by height (big-endian u64 keys).
    blocks: Tree,
    /// Reverse index: block hash -> height (8 bytes BE).
    block_hashes: Tree,
}

impl SledStore {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in a temporary directory and disappears on drop.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let blocks = db.open_tree("blocks")?;
        let block_hashes = db.open_tree("block_hashes")?;
        Ok(Self {
            db,
            blocks,
            block_hashes,
        })
    }

    fn block_at(&self, height: u64) -> StorageResult<Option<Block>> {
        match self.blocks.get(height.to_be_bytes())? {
            Some(bytes) => decode_block(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks in `[start, end)`, ascending.
    fn range(&self, start: u64, end: u64) -> StorageResult<Vec<Block>> {
        let mut blocks = Vec::with_capacity(end.saturating_sub(start) as usize);
        for entry in self.blocks.range(start.to_be_bytes()..end.to_be_bytes()) {
            let (_key, value) = entry?;
            blocks.push(decode_block(&value)?);
        }
        Ok(blocks)
    }

    fn window(&self, window: Option<(u64, u64)>, sort: SortOrder) -> StorageResult<Vec<Block>> {
        let Some((start, end)) = window else {
            return Ok(Vec::new());
        };
        let mut blocks = self.range(start, end)?;
        if sort == SortOrder::Desc {
            blocks.reverse();
        }
        Ok(blocks)
    }
}

impl BlockStore for SledStore {
    fn store_block(&self, block: &Block) -> StorageResult<()> {
        let size = self.chain_size()?;
        if block.height() > size {
            return Err(StorageError::HeightGap {
                height: block.height(),
                size,
            });
        }

        let height_key = block.height().to_be_bytes();
        let bytes =
            bincode::serialize(block).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let swapped = self
            .blocks
            .compare_and_swap(height_key, None as Option<&[u8]>, Some(bytes))?;
        if swapped.is_err() {
            return Err(StorageError::HeightTaken(block.height()));
        }

        self.block_hashes
            .insert(block.hash().as_bytes(), height_key.to_vec())?;
        self.db.flush()?;
        Ok(())
    }

    fn get_block(&self, hash: &str) -> StorageResult<Option<Block>> {
        match self.block_hashes.get(hash.as_bytes())? {
            Some(height_bytes) => self.block_at(decode_height(&height_bytes)?),
            None => Ok(None),
        }
    }

    fn latest_block(&self) -> StorageResult<Option<Block>> {
        match self.blocks.last()? {
            Some((_key, value)) => decode_block(&value).map(Some),
            None => Ok(None),
        }
    }

    fn chain_size(&self) -> StorageResult<u64> {
        // Dense heights: size is one past the tip.
        match self.blocks.last()? {
            Some((key, _value)) => Ok(decode_height(&key)? + 1),
            None => Ok(0),
        }
    }

    fn blocks(&self, page: usize, size: usize, sort: SortOrder) -> StorageResult<Vec<Block>> {
        let window = page_window(self.chain_size()?, page, size, sort);
        self.window(window, sort)
    }

    fn blocks_from_height(&self, from_height: u64, page: usize) -> StorageResult<Vec<Block>> {
        let window = from_height_window(self.chain_size()?, from_height, page);
        self.window(window, SortOrder::Desc)
    }
}

fn decode_block(bytes: &[u8]) -> StorageResult<Block> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_height(bytes: &[u8]) -> StorageResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Serialization("invalid height bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain(count: u64) -> Vec<Block> {
        let mut blocks = vec![Block::genesis_at(10)];
        for i in 1..count {
            let parent = &blocks[(i - 1) as usize];
            let block = Block::successor_at(parent, format!("[\"batch {i}\"]"), 10 + i);
            blocks.push(block);
        }
        blocks
    }

    fn fill(store: &SledStore, blocks: &[Block]) {
        for block in blocks {
            store.store_block(block).unwrap();
        }
    }

    #[test]
    fn open_temporary_store() {
        let store = SledStore::open_temporary().expect("should create temp store");
        assert_eq!(store.chain_size().unwrap(), 0);
        assert!(store.latest_block().unwrap().is_none());
    }

    #[test]
    fn store_and_retrieve_by_hash() {
        let store = SledStore::open_temporary().unwrap();
        let blocks = make_chain(3);
        fill(&store, &blocks);

        let found = store.get_block(blocks[1].hash()).unwrap();
        assert_eq!(found.as_ref(), Some(&blocks[1]));
        assert!(store.get_block("nope").unwrap().is_none());
        assert_eq!(store.latest_block().unwrap().as_ref(), blocks.last());
        assert_eq!(store.chain_size().unwrap(), 3);
    }

    #[test]
    fn duplicate_height_is_refused() {
        let store = SledStore::open_temporary().unwrap();
        let blocks = make_chain(2);
        fill(&store, &blocks);

        let rival = Block::successor_at(&blocks[0], "rival", 99);
        assert!(matches!(
            store.store_block(&rival),
            Err(StorageError::HeightTaken(1))
        ));
        assert_eq!(store.latest_block().unwrap().as_ref(), Some(&blocks[1]));
        assert!(store.get_block(rival.hash()).unwrap().is_none());
    }

    #[test]
    fn gap_is_refused() {
        let store = SledStore::open_temporary().unwrap();
        let orphan = Block::new("abc", "data", 1, 4);
        assert!(matches!(
            store.store_block(&orphan),
            Err(StorageError::HeightGap { height: 4, size: 0 })
        ));
    }

    #[test]
    fn paging_matches_memory_store() {
        use crate::storage::MemoryStore;

        let sled_store = SledStore::open_temporary().unwrap();
        let memory = MemoryStore::new();
        let blocks = make_chain(23);
        for block in &blocks {
            sled_store.store_block(block).unwrap();
            memory.store_block(block).unwrap();
        }

        for sort in [SortOrder::Asc, SortOrder::Desc] {
            for page in 0..4 {
                assert_eq!(
                    sled_store.blocks(page, 10, sort).unwrap(),
                    memory.blocks(page, 10, sort).unwrap()
                );
            }
        }
        for page in 0..3 {
            assert_eq!(
                sled_store.blocks_from_height(4, page).unwrap(),
                memory.blocks_from_height(4, page).unwrap()
            );
        }
    }

    #[test]
    fn chain_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocks = make_chain(4);
        {
            let store = SledStore::open(dir.path()).expect("open");
            fill(&store, &blocks);
        }

        let reopened = SledStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.chain_size().unwrap(), 4);
        assert_eq!(reopened.latest_block().unwrap().as_ref(), blocks.last());
        assert_eq!(
            reopened.get_block(blocks[2].hash()).unwrap().as_ref(),
            Some(&blocks[2])
        );
    }
}
