//! # tamperlog-config
//!
//! TOML configuration for a tamperlog deployment.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tamperlog_config::LedgerConfig;
//!
//! let config = LedgerConfig::from_file(Path::new("tamperlog.toml"))?;
//! let engine = config.build_engine()?;
//! engine.initialize()?;
//! ```

pub mod loader;
pub mod settings;

pub use settings::{
    ChainSettings, LedgerConfig, OperatorSettings, StorageBackend, StorageSettings,
    MAX_DIFFICULTY,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
