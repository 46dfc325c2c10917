//! Read-side and remediation result types returned to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::Block;

/// A window over the chain, ordered by index ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Block>,
    /// Number of blocks in the whole chain.
    pub total_count: u64,
    /// 1-based page number.
    pub page_number: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Outcome of truncating the chain at a tampered block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub deleted_count: u64,
    pub remaining_blocks: u64,
    pub message: String,
}

/// Outcome of wiping and reinitializing the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildOutcome {
    pub deleted_count: u64,
    /// The freshly created genesis block.
    pub genesis: Block,
    pub message: String,
}

/// A sealed copy of the chain for offline verification or archival.
///
/// `terminal_hash` is the `hash` of the last block and commits to the whole
/// sequence. Empty string when the chain is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainExport {
    pub exported_at: DateTime<Utc>,
    pub blocks: Vec<Block>,
    pub terminal_hash: String,
}
