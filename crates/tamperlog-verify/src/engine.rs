//! Full-scan chain verifier.
//!
//! `ChainVerifier` implements the `Verifier` trait from `tamperlog-core`.
//! It walks the sequence once with a one-block lookback and runs three
//! independent checks on every block:
//!
//! 1. **Sequence** — the stored index equals the block's position in the
//!    sequence.
//! 2. **Self-hash** — the stored `hash` equals the hash recomputed from the
//!    block's own fields.
//! 3. **Link** — the stored `previous_hash` equals the hash recomputed from
//!    the previous block's fields, or the genesis sentinel at position 0.
//!
//! The scan never stops at the first anomaly. An edit to one block's data
//! shows up as `DATA_MODIFIED` there and `CHAIN_BROKEN` on its successor;
//! both are reported.
//!
//! A record the store cannot decode is reported as `RECORD_UNREADABLE` at
//! its position. The block after it has nothing to link against, so its
//! link check is skipped.

use tracing::{debug, warn};

use tamperlog_contracts::{
    AnomalyKind, Block, IntegrityReport, LedgerError, LedgerResult, TamperedBlock,
};
use tamperlog_core::{hasher::hash_block, BlockStream, Verifier};

/// The tamperlog integrity verifier. Stateless; one instance can serve any
/// number of concurrent scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainVerifier;

impl ChainVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify an in-memory sequence, e.g. the blocks of an exported log.
    pub fn verify_blocks(&self, blocks: &[Block]) -> IntegrityReport {
        let mut scan = Scan::default();
        for block in blocks {
            scan.inspect(block);
        }
        scan.finish()
    }

    /// Fail-fast check: `Ok(false)` as soon as any anomaly is found.
    pub fn is_intact(&self, blocks: BlockStream) -> LedgerResult<bool> {
        let mut scan = Scan::default();
        for block in blocks {
            scan.consume(block)?;
            if !scan.anomalies.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Verifier for ChainVerifier {
    fn verify(&self, blocks: BlockStream) -> LedgerResult<IntegrityReport> {
        let mut scan = Scan::default();
        for block in blocks {
            scan.consume(block)?;
        }
        Ok(scan.finish())
    }
}

/// What the link check of the next block compares against.
#[derive(Default)]
enum Lookback {
    /// Nothing scanned yet: expect the genesis sentinel.
    #[default]
    Start,
    /// Hash recomputed from the previous block's fields.
    Hash(String),
    /// The previous record was unreadable.
    Unknown,
}

/// Running state of one verification pass.
#[derive(Default)]
struct Scan {
    position: u64,
    previous: Lookback,
    anomalies: Vec<TamperedBlock>,
}

impl Scan {
    /// Feed one stream item. Undecodable records become anomalies; any other
    /// error aborts the scan.
    fn consume(&mut self, item: LedgerResult<Block>) -> LedgerResult<()> {
        match item {
            Ok(block) => self.inspect(&block),
            Err(LedgerError::CorruptRecord { line, reason }) => self.unreadable(line, &reason),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn inspect(&mut self, block: &Block) {
        let position = self.position;
        let recalculated = hash_block(block);

        // ── Sequence ──────────────────────────────────────────────────────────
        if block.index != position {
            self.push(
                position,
                block,
                AnomalyKind::IndexMismatch,
                format!(
                    "Block index {} does not match its position {position}.",
                    block.index
                ),
                block.hash.clone(),
                recalculated.clone(),
            );
        }

        // ── Self-hash ─────────────────────────────────────────────────────────
        if block.hash != recalculated {
            self.push(
                position,
                block,
                AnomalyKind::DataModified,
                "Block data was modified. Stored hash does not match.".to_string(),
                block.hash.clone(),
                recalculated.clone(),
            );
        }

        // ── Link ──────────────────────────────────────────────────────────────
        let expected_prev = match &self.previous {
            Lookback::Start => Some((
                Block::GENESIS_PREVIOUS_HASH.to_string(),
                "Genesis block does not carry the sentinel previous hash.",
            )),
            Lookback::Hash(prev_hash) => Some((
                prev_hash.clone(),
                "Chain link broken. Previous hash does not match the preceding block.",
            )),
            Lookback::Unknown => None,
        };
        if let Some((expected_prev, description)) = expected_prev {
            if block.previous_hash != expected_prev {
                self.push(
                    position,
                    block,
                    AnomalyKind::ChainBroken,
                    description.to_string(),
                    block.previous_hash.clone(),
                    expected_prev,
                );
            }
        }

        self.previous = Lookback::Hash(recalculated);
        self.position += 1;
    }

    fn unreadable(&mut self, line: u64, reason: &str) {
        let position = self.position;
        warn!(
            index = position,
            line,
            kind = %AnomalyKind::RecordUnreadable,
            "tampering detected"
        );
        self.anomalies.push(TamperedBlock {
            index: position,
            kind: AnomalyKind::RecordUnreadable,
            description: format!("Stored record on line {line} could not be read: {reason}"),
            stored_hash: String::new(),
            recalculated_hash: String::new(),
            data: String::new(),
            timestamp: None,
        });
        self.previous = Lookback::Unknown;
        self.position += 1;
    }

    fn push(
        &mut self,
        position: u64,
        block: &Block,
        kind: AnomalyKind,
        description: String,
        stored_hash: String,
        recalculated_hash: String,
    ) {
        warn!(index = position, kind = %kind, "tampering detected");
        self.anomalies.push(TamperedBlock {
            index: position,
            kind,
            description,
            stored_hash,
            recalculated_hash,
            data: block.data.clone(),
            timestamp: Some(block.timestamp),
        });
    }

    fn finish(self) -> IntegrityReport {
        debug!(
            blocks = self.position,
            anomalies = self.anomalies.len(),
            "chain scan finished"
        );
        IntegrityReport::new(self.position, self.anomalies)
    }
}
