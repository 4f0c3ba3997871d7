//! In-memory [`BlockStore`]. Nothing survives the process; used by tests and
//! by nodes started with `--ephemeral`.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{from_height_window, page_window, BlockStore, SortOrder, StorageError, StorageResult};
use crate::ledger::Block;

#[derive(Debug, Default)]
struct Inner {
    /// Index == height.
    blocks: Vec<Block>,
    /// hash -> height
    by_hash: HashMap<String, u64>,
}

/// A `Vec<Block>` plus a hash index, behind one reader-writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slice(&self, window: Option<(u64, u64)>, sort: SortOrder) -> Vec<Block> {
        let Some((start, end)) = window else {
            return Vec::new();
        };
        let inner = self.inner.read();
        let slice = &inner.blocks[start as usize..end as usize];
        match sort {
            SortOrder::Asc => slice.to_vec(),
            SortOrder::Desc => slice.iter().rev().cloned().collect(),
        }
    }
}

impl BlockStore for MemoryStore {
    fn store_block(&self, block: &Block) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let size = inner.blocks.len() as u64;
        if block.height() < size {
            return Err(StorageError::HeightTaken(block.height()));
        }
        if block.height() > size {
            return Err(StorageError::HeightGap {
                height: block.height(),
                size,
            });
        }
        inner.by_hash.insert(block.hash().to_string(), block.height());
        inner.blocks.push(block.clone());
        Ok(())
    }

    fn get_block(&self, hash: &str) -> StorageResult<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .by_hash
            .get(hash)
            .and_then(|height| inner.blocks.get(*height as usize))
            .cloned())
    }

    fn latest_block(&self) -> StorageResult<Option<Block>> {
        Ok(self.inner.read().blocks.last().cloned())
    }

    fn chain_size(&self) -> StorageResult<u64> {
        Ok(self.inner.read().blocks.len() as u64)
    }

    fn blocks(&self, page: usize, size: usize, sort: SortOrder) -> StorageResult<Vec<Block>> {
        let window = page_window(self.chain_size()?, page, size, sort);
        Ok(self.slice(window, sort))
    }

    fn blocks_from_height(&self, from_height: u64, page: usize) -> StorageResult<Vec<Block>> {
        let window = from_height_window(self.chain_size()?, from_height, page);
        Ok(self.slice(window, SortOrder::Desc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: u64) -> MemoryStore {
        let store = MemoryStore::new();
        let mut tip = Block::genesis_at(1_000);
        store.store_block(&tip).unwrap();
        for i in 1..len {
            tip = Block::successor_at(&tip, format!("block {i}"), 1_000 + i);
            store.store_block(&tip).unwrap();
        }
        store
    }

    fn heights(blocks: &[Block]) -> Vec<u64> {
        blocks.iter().map(Block::height).collect()
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(store.chain_size().unwrap(), 0);
        assert!(store.latest_block().unwrap().is_none());
        assert!(store.blocks(0, 10, SortOrder::Asc).unwrap().is_empty());
    }

    #[test]
    fn test_store_and_lookup() {
        let store = chain(3);
        let tip = store.latest_block().unwrap().unwrap();
        assert_eq!(tip.height(), 2);
        assert_eq!(store.get_block(tip.hash()).unwrap(), Some(tip));
        assert!(store.get_block("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_height_refused() {
        let store = chain(2);
        let genesis = Block::genesis_at(99);
        assert!(matches!(
            store.store_block(&genesis),
            Err(StorageError::HeightTaken(0))
        ));
        assert_eq!(store.chain_size().unwrap(), 2);
    }

    #[test]
    fn test_gap_refused() {
        let store = MemoryStore::new();
        let orphan = Block::new("abc", "data", 5, 3);
        assert!(matches!(
            store.store_block(&orphan),
            Err(StorageError::HeightGap { height: 3, size: 0 })
        ));
    }

    #[test]
    fn test_paging() {
        let store = chain(25);
        assert_eq!(
            heights(&store.blocks(2, 10, SortOrder::Asc).unwrap()),
            (20..25).collect::<Vec<_>>()
        );
        assert_eq!(
            heights(&store.blocks(0, 3, SortOrder::Desc).unwrap()),
            vec![24, 23, 22]
        );
    }

    #[test]
    fn test_from_height() {
        let store = chain(25);
        let first = store.blocks_from_height(12, 0).unwrap();
        assert_eq!(heights(&first), (15..25).rev().collect::<Vec<_>>());
        let second = store.blocks_from_height(12, 1).unwrap();
        assert_eq!(heights(&second), vec![14, 13, 12]);
        assert!(store.blocks_from_height(12, 2).unwrap().is_empty());
    }
}
