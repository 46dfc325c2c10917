//! Loading, validating, and wiring a configured chain engine.
//!
//! `LedgerConfig` is parsed from a TOML string or file, validated, and then
//! turned into a `ChainEngine` backed by the configured store and a
//! `ChainVerifier`.

use std::path::Path;

use tracing::{debug, info};

use tamperlog_contracts::{LedgerError, LedgerResult};
use tamperlog_core::{BlockStore, ChainEngine, ChainOptions};
use tamperlog_store::{FileBlockStore, InMemoryBlockStore};
use tamperlog_verify::ChainVerifier;

use crate::settings::{LedgerConfig, StorageBackend, MAX_DIFFICULTY};

impl LedgerConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, does not match
    /// the schema, or fails validation.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse config TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.chain.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config {
                reason: format!(
                    "chain.difficulty must be at most {MAX_DIFFICULTY}, got {}",
                    self.chain.difficulty
                ),
            });
        }
        if self.operator.page_size == 0 {
            return Err(LedgerError::Config {
                reason: "operator.page_size must be at least 1".to_string(),
            });
        }
        if self.storage.effective_backend() == StorageBackend::File && self.storage.path.is_none()
        {
            return Err(LedgerError::Config {
                reason: "storage.path is required for the file backend".to_string(),
            });
        }
        Ok(())
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            difficulty: self.chain.difficulty,
        }
    }

    /// Open the configured store.
    pub fn open_store(&self) -> LedgerResult<Box<dyn BlockStore>> {
        match (self.storage.effective_backend(), &self.storage.path) {
            (StorageBackend::File, Some(path)) => Ok(Box::new(FileBlockStore::open(path)?)),
            (StorageBackend::File, None) => Err(LedgerError::Config {
                reason: "storage.path is required for the file backend".to_string(),
            }),
            (StorageBackend::Memory, _) => Ok(Box::new(InMemoryBlockStore::new())),
        }
    }

    /// Build a `ChainEngine` over the configured store.
    ///
    /// The chain is not initialized; call `ChainEngine::initialize` (or let
    /// the first append do it).
    pub fn build_engine(&self) -> LedgerResult<ChainEngine> {
        self.validate()?;
        let store = self.open_store()?;
        info!(
            backend = ?self.storage.effective_backend(),
            difficulty = self.chain.difficulty,
            "building chain engine"
        );
        Ok(ChainEngine::new(
            store,
            Box::new(ChainVerifier::new()),
            self.chain_options(),
        ))
    }
}
