//! Integrity report types produced by the verifier.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of anomaly found at a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// The stored hash does not match the hash recomputed from the block's
    /// own fields.
    DataModified,

    /// The stored `previous_hash` does not match the hash of the preceding
    /// block (or the genesis sentinel at index 0).
    ChainBroken,

    /// The stored index does not match the block's position in the chain.
    IndexMismatch,

    /// The stored record could not be decoded into a block at all.
    RecordUnreadable,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::DataModified => "DATA_MODIFIED",
            AnomalyKind::ChainBroken => "CHAIN_BROKEN",
            AnomalyKind::IndexMismatch => "INDEX_MISMATCH",
            AnomalyKind::RecordUnreadable => "RECORD_UNREADABLE",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anomaly found during verification.
///
/// For `DataModified`, `stored_hash` is the block's `hash` and
/// `recalculated_hash` is recomputed from its fields. For `ChainBroken`,
/// `stored_hash` is the block's `previous_hash` and `recalculated_hash` is the
/// value it should link to. For `IndexMismatch` both carry the block's hash.
/// For `RecordUnreadable` no field could be read: the hashes and `data` are
/// empty and `timestamp` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperedBlock {
    /// Position of the block in the scanned sequence.
    pub index: u64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Human-readable explanation for the operator.
    pub description: String,
    pub stored_hash: String,
    pub recalculated_hash: String,
    /// The block's payload as currently stored.
    pub data: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The result of a full chain verification.
///
/// `valid` is true iff `tampered_blocks` is empty. Anomalies are ordered by
/// index, and within one index in check order (index, self-hash, link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    /// Number of blocks scanned.
    pub total_blocks: u64,
    pub tampered_blocks: Vec<TamperedBlock>,
    pub tampered_count: usize,
    pub message: String,
}

impl IntegrityReport {
    /// Build a report from the collected anomalies.
    pub fn new(total_blocks: u64, tampered_blocks: Vec<TamperedBlock>) -> Self {
        let valid = tampered_blocks.is_empty();
        let message = if valid {
            "Blockchain is VALID".to_string()
        } else {
            "Blockchain is INVALID (Tampered)".to_string()
        };
        Self {
            valid,
            total_blocks,
            tampered_count: tampered_blocks.len(),
            tampered_blocks,
            message,
        }
    }

    /// Distinct block indices that carry at least one anomaly, ascending.
    pub fn tampered_indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.tampered_blocks.iter().map(|t| t.index).collect();
        indices.dedup();
        indices
    }

    /// The lowest tampered index, i.e. the natural repair point.
    pub fn first_tampered_index(&self) -> Option<u64> {
        self.tampered_blocks.first().map(|t| t.index)
    }

    /// Anomalies of a given kind.
    pub fn of_kind(&self, kind: AnomalyKind) -> impl Iterator<Item = &TamperedBlock> {
        self.tampered_blocks.iter().filter(move |t| t.kind == kind)
    }
}
