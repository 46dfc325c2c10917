//! Trait seams between the chain engine and its collaborators.
//!
//! - `BlockStore` — durable, ordered, append-only block persistence
//! - `Verifier`   — read-only integrity scan over a block sequence
//!
//! The engine owns one of each and serializes every write through its own
//! writer lock. Stores still enforce index contiguity on `append` as a last
//! line of consistency.

use std::sync::Arc;

use tamperlog_contracts::{Block, IntegrityReport, LedgerResult};

/// A lazy, finite sequence of blocks in index order.
///
/// Each stream is a point-in-time snapshot: writes that land after the
/// stream was opened are not observed by it. Call `BlockStore::read_all`
/// again to restart.
pub type BlockStream = Box<dyn Iterator<Item = LedgerResult<Block>> + Send>;

/// Ordered, append-only persistence of blocks.
pub trait BlockStore: Send + Sync {
    /// Persist `block` as the new tail.
    ///
    /// Fails with `InvariantViolation` unless `block.index` is exactly one
    /// past the current tail (or 0 when empty).
    fn append(&self, block: &Block) -> LedgerResult<()>;

    /// Open a snapshot of every stored block in index order.
    fn read_all(&self) -> LedgerResult<BlockStream>;

    /// Delete every block with index `>= index`. Returns how many were
    /// removed.
    ///
    /// Fails with `NotFound` if `index` is beyond the current tail.
    fn truncate_from(&self, index: u64) -> LedgerResult<u64>;

    /// Delete every block. Returns how many were removed.
    fn clear(&self) -> LedgerResult<u64>;

    /// The last stored block, if any.
    fn tail(&self) -> LedgerResult<Option<Block>>;

    /// Number of stored blocks.
    fn count(&self) -> LedgerResult<u64>;

    /// Up to `limit` blocks starting at position `start`, together with the
    /// total block count. Both come from the same state of the store.
    fn window(&self, start: u64, limit: usize) -> LedgerResult<(Vec<Block>, u64)>;
}

/// A shared store, so a caller can keep a handle to the store it gave the
/// engine.
impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn append(&self, block: &Block) -> LedgerResult<()> {
        (**self).append(block)
    }

    fn read_all(&self) -> LedgerResult<BlockStream> {
        (**self).read_all()
    }

    fn truncate_from(&self, index: u64) -> LedgerResult<u64> {
        (**self).truncate_from(index)
    }

    fn clear(&self) -> LedgerResult<u64> {
        (**self).clear()
    }

    fn tail(&self) -> LedgerResult<Option<Block>> {
        (**self).tail()
    }

    fn count(&self) -> LedgerResult<u64> {
        (**self).count()
    }

    fn window(&self, start: u64, limit: usize) -> LedgerResult<(Vec<Block>, u64)> {
        (**self).window(start, limit)
    }
}

/// Walks a block sequence and reports every integrity anomaly.
///
/// Tampering is a result, not an error: implementations return `Err` only
/// when the sequence itself cannot be read.
pub trait Verifier: Send + Sync {
    fn verify(&self, blocks: BlockStream) -> LedgerResult<IntegrityReport>;
}
