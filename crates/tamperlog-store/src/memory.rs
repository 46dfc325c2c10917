//! In-memory implementation of `BlockStore`.
//!
//! `InMemoryBlockStore` keeps the chain in an `Arc<Vec<Block>>` behind an
//! `RwLock`. Writers copy-on-write through `Arc::make_mut`, so a snapshot
//! handed out by `read_all()` is just a clone of the `Arc` and never sees
//! later writes.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use tamperlog_contracts::{Block, LedgerError, LedgerResult};
use tamperlog_core::{BlockStore, BlockStream};

/// A volatile, thread-safe block store.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<Arc<Vec<Block>>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a sequence verbatim, without any chain checks.
    ///
    /// Used to verify exported logs offline.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: RwLock::new(Arc::new(blocks)),
        }
    }

    /// Edit the stored block at position `index` in place, bypassing every
    /// guard.
    ///
    /// This simulates an out-of-band edit of the underlying storage; nothing
    /// in the engine calls it.
    pub fn tamper<F>(&self, index: u64, edit: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut Block),
    {
        let mut guard = self.write()?;
        let position = usize::try_from(index).map_err(|_| LedgerError::NotFound { index })?;
        let blocks = Arc::make_mut(&mut guard);
        let block = blocks
            .get_mut(position)
            .ok_or(LedgerError::NotFound { index })?;
        edit(block);
        Ok(())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Arc<Vec<Block>>>> {
        self.blocks
            .read()
            .map_err(|e| LedgerError::store(format!("block store lock poisoned: {e}")))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Arc<Vec<Block>>>> {
        self.blocks
            .write()
            .map_err(|e| LedgerError::store(format!("block store lock poisoned: {e}")))
    }
}

impl BlockStore for InMemoryBlockStore {
    fn append(&self, block: &Block) -> LedgerResult<()> {
        let mut guard = self.write()?;
        let expected = guard.len() as u64;
        if block.index != expected {
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "out-of-sequence append: expected index {expected}, got {}",
                    block.index
                ),
            });
        }
        Arc::make_mut(&mut guard).push(block.clone());
        debug!(index = block.index, "block stored in memory");
        Ok(())
    }

    fn read_all(&self) -> LedgerResult<BlockStream> {
        let snapshot = Arc::clone(&*self.read()?);
        Ok(Box::new(SnapshotIter {
            blocks: snapshot,
            position: 0,
        }))
    }

    fn truncate_from(&self, index: u64) -> LedgerResult<u64> {
        let mut guard = self.write()?;
        let len = guard.len() as u64;
        if index >= len {
            return Err(LedgerError::NotFound { index });
        }
        Arc::make_mut(&mut guard).truncate(index as usize);
        Ok(len - index)
    }

    fn clear(&self) -> LedgerResult<u64> {
        let mut guard = self.write()?;
        let len = guard.len() as u64;
        *guard = Arc::new(Vec::new());
        Ok(len)
    }

    fn tail(&self) -> LedgerResult<Option<Block>> {
        Ok(self.read()?.last().cloned())
    }

    fn count(&self) -> LedgerResult<u64> {
        Ok(self.read()?.len() as u64)
    }

    fn window(&self, start: u64, limit: usize) -> LedgerResult<(Vec<Block>, u64)> {
        let guard = self.read()?;
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        let items = guard.iter().skip(start).take(limit).cloned().collect();
        Ok((items, guard.len() as u64))
    }
}

/// Iterator over a frozen copy of the chain.
struct SnapshotIter {
    blocks: Arc<Vec<Block>>,
    position: usize,
}

impl Iterator for SnapshotIter {
    type Item = LedgerResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.blocks.get(self.position)?.clone();
        self.position += 1;
        Some(Ok(block))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.blocks.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}
