//! The block record persisted by every store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the audit chain.
///
/// Blocks are written once by the chain engine and never modified
/// afterwards. `hash` commits to `index`, `timestamp`, `data`,
/// `previous_hash` and `nonce`; `previous_hash` commits to the block before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, starting at 0 for the genesis block.
    pub index: u64,

    /// Creation time (UTC). Non-decreasing along the chain.
    pub timestamp: DateTime<Utc>,

    /// Opaque description of the audited action.
    pub data: String,

    /// Hash of the preceding block, or `GENESIS_PREVIOUS_HASH` at index 0.
    pub previous_hash: String,

    /// SHA-256 (hex) over this block's canonical fields.
    pub hash: String,

    /// Proof-of-work counter. Zero when mining is disabled.
    #[serde(default)]
    pub nonce: u64,
}

impl Block {
    /// `previous_hash` of the genesis block: 64 hex zeros.
    pub const GENESIS_PREVIOUS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// Payload of the genesis block.
    pub const GENESIS_DATA: &'static str = "Genesis Block";

    /// True for index 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// First `len` characters of the hash, for display.
    pub fn short_hash(&self, len: usize) -> &str {
        truncate_hash(&self.hash, len)
    }
}

/// Return at most `len` leading characters of a hex digest.
///
/// Digests are ASCII, but anything read from an edited store may not be, so
/// the cut is moved back to the nearest char boundary.
pub fn truncate_hash(hash: &str, len: usize) -> &str {
    if hash.len() <= len {
        return hash;
    }
    let mut end = len;
    while !hash.is_char_boundary(end) {
        end -= 1;
    }
    &hash[..end]
}
