//! The chain engine: the single writer of the audit chain.
//!
//! Every mutating operation (initialize, append, repair, rebuild) runs under
//! one writer lock, so the read-tail / compute / persist sequence of an
//! append can never interleave with another append or with a truncation.
//! Reads (`verify`, `page`, `export`) do not take the lock; they rely on the
//! store's snapshot guarantee instead.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use tamperlog_contracts::{
    block::truncate_hash, Block, ChainExport, IntegrityReport, LedgerError, LedgerResult, Page,
    RebuildOutcome, RepairOutcome,
};

use crate::{
    hasher::{hash_fields, mine},
    traits::{BlockStore, BlockStream, Verifier},
};

/// Highest proof-of-work difficulty an engine will mine at. Each step
/// multiplies the expected append cost by 16.
pub const MAX_DIFFICULTY: u32 = 8;

/// Tunables for block creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainOptions {
    /// Leading hex zeros required of every appended block's hash.
    /// 0 disables proof-of-work. Never applied to the genesis block.
    /// Capped at [`MAX_DIFFICULTY`] by [`ChainEngine::new`].
    pub difficulty: u32,
}

/// Owns the append protocol over a `BlockStore`.
pub struct ChainEngine {
    store: Box<dyn BlockStore>,
    verifier: Box<dyn Verifier>,
    options: ChainOptions,
    writer: Mutex<()>,
}

impl ChainEngine {
    pub fn new(
        store: Box<dyn BlockStore>,
        verifier: Box<dyn Verifier>,
        mut options: ChainOptions,
    ) -> Self {
        if options.difficulty > MAX_DIFFICULTY {
            warn!(
                requested = options.difficulty,
                max = MAX_DIFFICULTY,
                "difficulty capped"
            );
            options.difficulty = MAX_DIFFICULTY;
        }
        Self {
            store,
            verifier,
            options,
            writer: Mutex::new(()),
        }
    }

    pub fn options(&self) -> ChainOptions {
        self.options
    }

    /// Create the genesis block if the chain is empty.
    ///
    /// Returns the new genesis block, or `None` when the chain was already
    /// populated (in which case nothing changes).
    pub fn initialize(&self) -> LedgerResult<Option<Block>> {
        let _guard = self.lock_writer()?;
        if self.store.tail()?.is_some() {
            debug!("chain already initialized");
            return Ok(None);
        }
        self.create_genesis().map(Some)
    }

    /// Append `data` as a new block linked to the current tail.
    ///
    /// An empty chain is initialized first.
    pub fn append(&self, data: &str) -> LedgerResult<Block> {
        let _guard = self.lock_writer()?;

        let tail = match self.store.tail()? {
            Some(tail) => tail,
            None => self.create_genesis()?,
        };

        let index = tail.index + 1;
        // Link to the tail's stored hash: a tampered tail stays visibly
        // unlinked instead of being vouched for by its successor.
        let previous_hash = tail.hash;
        let timestamp = Utc::now().max(tail.timestamp);
        let (nonce, hash) = mine(index, &timestamp, data, &previous_hash, self.options.difficulty);

        let block = Block {
            index,
            timestamp,
            data: data.to_string(),
            previous_hash,
            hash,
            nonce,
        };
        self.store.append(&block)?;

        info!(
            index = block.index,
            hash = %block.short_hash(8),
            nonce = block.nonce,
            "appended block"
        );
        Ok(block)
    }

    /// Best-effort append for collaborators recording an audited action.
    ///
    /// A failure is logged and swallowed: the business action that produced
    /// the description must not fail because the audit write did.
    pub fn record(&self, description: &str) -> Option<Block> {
        match self.append(description) {
            Ok(block) => Some(block),
            Err(e) => {
                error!(error = %e, description = %description, "failed to record audit entry");
                None
            }
        }
    }

    /// A 1-based page of blocks ordered by index.
    pub fn page(&self, page_number: u64, page_size: u64) -> LedgerResult<Page> {
        if page_number == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "page numbers start at 1".to_string(),
            });
        }
        if page_size == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "page size must be at least 1".to_string(),
            });
        }

        let start = (page_number - 1).saturating_mul(page_size);
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);
        let (items, total_count) = self.store.window(start, limit)?;

        Ok(Page {
            items,
            total_count,
            page_number,
            page_size,
            total_pages: total_count.div_ceil(page_size),
        })
    }

    /// A point-in-time stream over every stored block.
    pub fn snapshot(&self) -> LedgerResult<BlockStream> {
        self.store.read_all()
    }

    /// Scan the whole chain and report every anomaly.
    pub fn verify(&self) -> LedgerResult<IntegrityReport> {
        let blocks = self.store.read_all()?;
        let report = self.verifier.verify(blocks)?;
        if report.valid {
            info!(total_blocks = report.total_blocks, "chain verification passed");
        } else {
            warn!(
                total_blocks = report.total_blocks,
                tampered_count = report.tampered_count,
                "chain verification found tampering"
            );
        }
        Ok(report)
    }

    /// Discard block `index` and everything after it.
    ///
    /// Blocks before `index` are kept as they are and are not re-verified.
    pub fn repair(&self, index: u64) -> LedgerResult<RepairOutcome> {
        if index == 0 {
            return Err(LedgerError::GenesisProtected);
        }

        let _guard = self.lock_writer()?;
        let deleted_count = self.store.truncate_from(index)?;
        let remaining_blocks = self.store.count()?;

        warn!(
            from_index = index,
            deleted_count, remaining_blocks, "repair truncated chain"
        );
        Ok(RepairOutcome {
            deleted_count,
            remaining_blocks,
            message: format!("Deleted {deleted_count} block(s) starting from block #{index}"),
        })
    }

    /// Destroy the whole chain and start over from a fresh genesis block.
    pub fn rebuild(&self) -> LedgerResult<RebuildOutcome> {
        let _guard = self.lock_writer()?;
        let deleted_count = self.store.clear()?;
        let genesis = self.create_genesis()?;

        warn!(deleted_count, "chain rebuilt from a fresh genesis block");
        Ok(RebuildOutcome {
            deleted_count,
            genesis,
            message: format!("Blockchain rebuilt. Deleted {deleted_count} old block(s)."),
        })
    }

    /// Copy the current chain into a sealed export.
    pub fn export(&self) -> LedgerResult<ChainExport> {
        let blocks = self.store.read_all()?.collect::<LedgerResult<Vec<_>>>()?;
        let terminal_hash = blocks.last().map(|b| b.hash.clone()).unwrap_or_default();
        Ok(ChainExport {
            exported_at: Utc::now(),
            blocks,
            terminal_hash,
        })
    }

    pub fn tail(&self) -> LedgerResult<Option<Block>> {
        self.store.tail()
    }

    pub fn len(&self) -> LedgerResult<u64> {
        self.store.count()
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.store.count()? == 0)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn lock_writer(&self) -> LedgerResult<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|e| LedgerError::store(format!("chain writer lock poisoned: {e}")))
    }

    /// Caller must hold the writer lock and the store must be empty.
    fn create_genesis(&self) -> LedgerResult<Block> {
        let timestamp = Utc::now();
        let hash = hash_fields(
            0,
            &timestamp,
            Block::GENESIS_DATA,
            Block::GENESIS_PREVIOUS_HASH,
            0,
        );
        let genesis = Block {
            index: 0,
            timestamp,
            data: Block::GENESIS_DATA.to_string(),
            previous_hash: Block::GENESIS_PREVIOUS_HASH.to_string(),
            hash,
            nonce: 0,
        };
        self.store.append(&genesis)?;
        info!(hash = %truncate_hash(&genesis.hash, 8), "created genesis block");
        Ok(genesis)
    }
}

/// Whether a report is bad enough that truncating is not worth it.
///
/// This is an operator heuristic; the engine itself never applies it.
pub fn suggests_rebuild(report: &IntegrityReport, threshold: usize) -> bool {
    report.tampered_count > threshold
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use chrono::Duration;

    use tamperlog_contracts::{AnomalyKind, TamperedBlock};

    use super::*;
    use crate::hasher::{hash_block, meets_difficulty};

    // ── Mocks ─────────────────────────────────────────────────────────────────

    /// A vector-backed store that enforces the append guard.
    #[derive(Default)]
    struct VecStore {
        blocks: Arc<Mutex<Vec<Block>>>,
    }

    impl BlockStore for VecStore {
        fn append(&self, block: &Block) -> LedgerResult<()> {
            let mut blocks = self.blocks.lock().unwrap();
            let expected = blocks.len() as u64;
            if block.index != expected {
                return Err(LedgerError::InvariantViolation {
                    reason: format!("expected index {expected}, got {}", block.index),
                });
            }
            blocks.push(block.clone());
            Ok(())
        }

        fn read_all(&self) -> LedgerResult<BlockStream> {
            let snapshot = self.blocks.lock().unwrap().clone();
            Ok(Box::new(snapshot.into_iter().map(Ok)))
        }

        fn truncate_from(&self, index: u64) -> LedgerResult<u64> {
            let mut blocks = self.blocks.lock().unwrap();
            let len = blocks.len() as u64;
            if index >= len {
                return Err(LedgerError::NotFound { index });
            }
            blocks.truncate(index as usize);
            Ok(len - index)
        }

        fn clear(&self) -> LedgerResult<u64> {
            let mut blocks = self.blocks.lock().unwrap();
            let len = blocks.len() as u64;
            blocks.clear();
            Ok(len)
        }

        fn tail(&self) -> LedgerResult<Option<Block>> {
            Ok(self.blocks.lock().unwrap().last().cloned())
        }

        fn count(&self) -> LedgerResult<u64> {
            Ok(self.blocks.lock().unwrap().len() as u64)
        }

        fn window(&self, start: u64, limit: usize) -> LedgerResult<(Vec<Block>, u64)> {
            let blocks = self.blocks.lock().unwrap();
            let items = blocks.iter().skip(start as usize).take(limit).cloned().collect();
            Ok((items, blocks.len() as u64))
        }
    }

    /// A store whose writes always fail.
    struct FailingStore;

    impl BlockStore for FailingStore {
        fn append(&self, _block: &Block) -> LedgerResult<()> {
            Err(LedgerError::store("disk full"))
        }
        fn read_all(&self) -> LedgerResult<BlockStream> {
            Err(LedgerError::store("disk unreadable"))
        }
        fn truncate_from(&self, index: u64) -> LedgerResult<u64> {
            Err(LedgerError::NotFound { index })
        }
        fn clear(&self) -> LedgerResult<u64> {
            Err(LedgerError::store("disk full"))
        }
        fn tail(&self) -> LedgerResult<Option<Block>> {
            Ok(None)
        }
        fn count(&self) -> LedgerResult<u64> {
            Ok(0)
        }
        fn window(&self, _start: u64, _limit: usize) -> LedgerResult<(Vec<Block>, u64)> {
            Ok((vec![], 0))
        }
    }

    /// Flags any block whose stored hash does not match its fields.
    struct HashOnlyVerifier;

    impl Verifier for HashOnlyVerifier {
        fn verify(&self, blocks: BlockStream) -> LedgerResult<IntegrityReport> {
            let mut total = 0;
            let mut tampered = Vec::new();
            for block in blocks {
                let block = block?;
                total += 1;
                let recalculated = hash_block(&block);
                if recalculated != block.hash {
                    tampered.push(TamperedBlock {
                        index: block.index,
                        kind: AnomalyKind::DataModified,
                        description: "hash mismatch".to_string(),
                        stored_hash: block.hash.clone(),
                        recalculated_hash: recalculated,
                        data: block.data.clone(),
                        timestamp: Some(block.timestamp),
                    });
                }
            }
            Ok(IntegrityReport::new(total, tampered))
        }
    }

    fn engine_with(store: VecStore, difficulty: u32) -> ChainEngine {
        ChainEngine::new(
            Box::new(store),
            Box::new(HashOnlyVerifier),
            ChainOptions { difficulty },
        )
    }

    fn engine() -> (ChainEngine, Arc<Mutex<Vec<Block>>>) {
        let store = VecStore::default();
        let blocks = store.blocks.clone();
        (engine_with(store, 0), blocks)
    }

    // ── initialize ────────────────────────────────────────────────────────────

    #[test]
    fn initialize_creates_genesis() {
        let (engine, blocks) = engine();
        let genesis = engine.initialize().unwrap().expect("genesis created");

        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.data, Block::GENESIS_DATA);
        assert_eq!(genesis.previous_hash, Block::GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.hash, hash_block(&genesis));
        assert_eq!(blocks.lock().unwrap().len(), 1);
    }

    #[test]
    fn initialize_is_idempotent() {
        let (engine, _) = engine();
        engine.initialize().unwrap();
        engine.append("Login user A").unwrap();
        let tail_before = engine.tail().unwrap();

        assert!(engine.initialize().unwrap().is_none());
        assert_eq!(engine.len().unwrap(), 2);
        assert_eq!(engine.tail().unwrap(), tail_before);
    }

    // ── append ────────────────────────────────────────────────────────────────

    #[test]
    fn append_links_to_tail() {
        let (engine, blocks) = engine();
        engine.initialize().unwrap();
        let first = engine.append("Login user A").unwrap();
        let second = engine.append("Upload file X").unwrap();

        let blocks = blocks.lock().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);
        assert_eq!(first.previous_hash, blocks[0].hash);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(second.hash, hash_block(&second));
    }

    #[test]
    fn append_on_empty_chain_initializes_first() {
        let (engine, blocks) = engine();
        let block = engine.append("Login user A").unwrap();

        assert_eq!(block.index, 1);
        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data, Block::GENESIS_DATA);
    }

    #[test]
    fn indices_are_contiguous() {
        let (engine, blocks) = engine();
        for i in 0..20 {
            engine.append(&format!("event {i}")).unwrap();
        }
        let blocks = blocks.lock().unwrap();
        for (position, block) in blocks.iter().enumerate() {
            assert_eq!(block.index, position as u64);
        }
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let (engine, blocks) = engine();
        engine.initialize().unwrap();
        // Push the tail into the future, as if the wall clock had stepped back.
        let future = Utc::now() + Duration::hours(1);
        blocks.lock().unwrap()[0].timestamp = future;

        let block = engine.append("after clock step").unwrap();
        assert_eq!(block.timestamp, future);
    }

    #[test]
    fn append_mines_when_difficulty_is_set() {
        let engine = engine_with(VecStore::default(), 1);
        let block = engine.append("mined").unwrap();
        assert!(meets_difficulty(&block.hash, 1));
        assert_eq!(block.hash, hash_block(&block));

        let genesis = engine.page(1, 1).unwrap().items.remove(0);
        assert_eq!(genesis.nonce, 0);
    }

    #[test]
    fn concurrent_appends_never_share_an_index() {
        let store = VecStore::default();
        let blocks = store.blocks.clone();
        let engine = Arc::new(engine_with(store, 0));
        engine.initialize().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..25 {
                        engine.append(&format!("thread {t} event {i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 1 + 8 * 25);
        for (position, block) in blocks.iter().enumerate() {
            assert_eq!(block.index, position as u64);
            if position > 0 {
                assert_eq!(block.previous_hash, blocks[position - 1].hash);
            }
        }
    }

    // ── record ────────────────────────────────────────────────────────────────

    #[test]
    fn record_returns_block_on_success() {
        let (engine, _) = engine();
        let block = engine.record("User alice logged in").unwrap();
        assert_eq!(block.data, "User alice logged in");
    }

    #[test]
    fn record_swallows_store_failures() {
        let engine = ChainEngine::new(
            Box::new(FailingStore),
            Box::new(HashOnlyVerifier),
            ChainOptions::default(),
        );
        assert!(engine.append("x").is_err());
        assert!(engine.record("x").is_none());
    }

    // ── page ──────────────────────────────────────────────────────────────────

    #[test]
    fn page_returns_window_and_totals() {
        let (engine, _) = engine();
        for i in 0..11 {
            engine.append(&format!("event {i}")).unwrap();
        }
        // 12 blocks including genesis.
        let page = engine.page(2, 5).unwrap();
        assert_eq!(page.total_count, 12);
        assert_eq!(page.total_pages, 3);
        let indices: Vec<u64> = page.items.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![5, 6, 7, 8, 9]);

        let last = engine.page(3, 5).unwrap();
        assert_eq!(last.items.len(), 2);

        let beyond = engine.page(4, 5).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 12);
    }

    #[test]
    fn page_totals_match_items_during_truncation() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        engine.initialize().unwrap();

        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for round in 0..50 {
                    for i in 0..6 {
                        engine.append(&format!("round {round} event {i}")).unwrap();
                    }
                    engine.repair(1).unwrap();
                }
            })
        };
        for _ in 0..500 {
            let page = engine.page(2, 3).unwrap();
            let expected = page.total_count.saturating_sub(3).min(3);
            assert_eq!(page.items.len() as u64, expected, "{page:?}");
            for (offset, block) in page.items.iter().enumerate() {
                assert_eq!(block.index, 3 + offset as u64);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn page_rejects_zero_arguments() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.page(0, 10),
            Err(LedgerError::InvalidArgument { .. })
        ));
        assert!(matches!(
            engine.page(1, 0),
            Err(LedgerError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn difficulty_is_capped() {
        let engine = engine_with(VecStore::default(), 65);
        assert_eq!(engine.options().difficulty, MAX_DIFFICULTY);

        let engine = engine_with(VecStore::default(), MAX_DIFFICULTY);
        assert_eq!(engine.options().difficulty, MAX_DIFFICULTY);
    }

    // ── verify ────────────────────────────────────────────────────────────────

    #[test]
    fn verify_delegates_to_verifier() {
        let (engine, blocks) = engine();
        engine.append("a").unwrap();
        engine.append("b").unwrap();
        assert!(engine.verify().unwrap().valid);

        blocks.lock().unwrap()[1].data = "changed".to_string();
        let report = engine.verify().unwrap();
        assert!(!report.valid);
        assert_eq!(report.tampered_blocks[0].index, 1);
    }

    #[test]
    fn verify_surfaces_store_errors() {
        let engine = ChainEngine::new(
            Box::new(FailingStore),
            Box::new(HashOnlyVerifier),
            ChainOptions::default(),
        );
        assert!(matches!(engine.verify(), Err(LedgerError::Store { .. })));
    }

    // ── repair / rebuild ──────────────────────────────────────────────────────

    #[test]
    fn repair_truncates_from_index() {
        let (engine, _) = engine();
        for i in 0..5 {
            engine.append(&format!("event {i}")).unwrap();
        }
        let outcome = engine.repair(2).unwrap();

        assert_eq!(outcome.deleted_count, 4);
        assert_eq!(outcome.remaining_blocks, 2);
        assert!(outcome.message.contains("#2"));
        assert_eq!(engine.tail().unwrap().unwrap().index, 1);

        // The chain keeps growing from the truncation point.
        assert_eq!(engine.append("after repair").unwrap().index, 2);
    }

    #[test]
    fn repair_refuses_genesis() {
        let (engine, _) = engine();
        engine.initialize().unwrap();
        assert!(matches!(engine.repair(0), Err(LedgerError::GenesisProtected)));
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn repair_beyond_tail_is_not_found() {
        let (engine, _) = engine();
        engine.append("a").unwrap();
        assert!(matches!(
            engine.repair(5),
            Err(LedgerError::NotFound { index: 5 })
        ));
    }

    #[test]
    fn rebuild_leaves_only_genesis() {
        let (engine, blocks) = engine();
        for i in 0..6 {
            engine.append(&format!("event {i}")).unwrap();
        }
        blocks.lock().unwrap()[3].data = "tampered".to_string();

        let outcome = engine.rebuild().unwrap();
        assert_eq!(outcome.deleted_count, 7);
        assert_eq!(outcome.genesis.previous_hash, Block::GENESIS_PREVIOUS_HASH);

        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], outcome.genesis);
    }

    #[test]
    fn rebuild_on_empty_chain_creates_genesis() {
        let (engine, _) = engine();
        let outcome = engine.rebuild().unwrap();
        assert_eq!(outcome.deleted_count, 0);
        assert_eq!(engine.len().unwrap(), 1);
    }

    // ── export ────────────────────────────────────────────────────────────────

    #[test]
    fn export_seals_terminal_hash() {
        let (engine, _) = engine();
        engine.append("a").unwrap();
        let last = engine.append("b").unwrap();

        let export = engine.export().unwrap();
        assert_eq!(export.blocks.len(), 3);
        assert_eq!(export.terminal_hash, last.hash);
    }

    #[test]
    fn export_of_empty_chain_has_empty_terminal_hash() {
        let (engine, _) = engine();
        assert_eq!(engine.export().unwrap().terminal_hash, "");
    }

    #[test]
    fn rebuild_threshold_is_strictly_greater() {
        let report = |n: usize| {
            let anomalies = (0..n)
                .map(|i| TamperedBlock {
                    index: i as u64 + 1,
                    kind: AnomalyKind::DataModified,
                    description: String::new(),
                    stored_hash: String::new(),
                    recalculated_hash: String::new(),
                    data: String::new(),
                    timestamp: Some(Utc::now()),
                })
                .collect();
            IntegrityReport::new(10, anomalies)
        };
        assert!(!suggests_rebuild(&report(3), 3));
        assert!(suggests_rebuild(&report(4), 3));
    }
}
