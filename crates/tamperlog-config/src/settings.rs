//! Configuration schema.
//!
//! A `LedgerConfig` is deserialized from TOML. Every section and key is
//! optional; missing values fall back to the defaults documented on each
//! field.
//!
//! Example:
//! ```toml
//! [storage]
//! backend = "file"
//! path = "data/chain.jsonl"
//!
//! [chain]
//! difficulty = 2
//!
//! [operator]
//! rebuild_threshold = 3
//! page_size = 10
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use tamperlog_core::MAX_DIFFICULTY;

/// Where blocks are persisted.
///
/// Expressed in TOML as a lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    /// Defaults to `file` when `path` is set, `memory` otherwise.
    pub backend: Option<StorageBackend>,

    /// JSON Lines file holding the chain. Required for the file backend.
    pub path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn effective_backend(&self) -> StorageBackend {
        self.backend.unwrap_or(if self.path.is_some() {
            StorageBackend::File
        } else {
            StorageBackend::Memory
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainSettings {
    /// Leading hex zeros required of each appended block's hash.
    /// Default 2; 0 disables mining.
    pub difficulty: u32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self { difficulty: 2 }
    }
}

/// Knobs for the operator surface. None of these affect the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatorSettings {
    /// Suggest a full rebuild when a report holds more anomalies than this.
    /// Default 3.
    pub rebuild_threshold: usize,

    /// Default number of blocks per listing page. Default 10.
    pub page_size: u64,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            rebuild_threshold: 3,
            page_size: 10,
        }
    }
}

/// The top-level structure deserialized from a TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub storage: StorageSettings,
    pub chain: ChainSettings,
    pub operator: OperatorSettings,
}
