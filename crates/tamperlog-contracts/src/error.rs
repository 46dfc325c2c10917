//! Error types for the tamperlog chain.
//!
//! Every fallible operation in the workspace returns `LedgerResult<T>`.
//! Tampering is never an error: it is reported through `IntegrityReport`.

use thiserror::Error;

/// The unified error type for tamperlog.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store could not read or persist blocks.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// An operation referenced a block index that does not exist.
    #[error("block #{index} not found")]
    NotFound { index: u64 },

    /// The store refused a write that would break index contiguity.
    ///
    /// Should never surface when blocks are only written through the engine.
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// A persisted record could not be decoded.
    #[error("corrupt record at line {line}: {reason}")]
    CorruptRecord { line: u64, reason: String },

    /// The genesis block cannot be removed by a repair.
    #[error("the genesis block (#0) cannot be deleted; use rebuild instead")]
    GenesisProtected,

    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl LedgerError {
    /// Shorthand for wrapping an I/O or lock failure.
    pub fn store(reason: impl std::fmt::Display) -> Self {
        Self::Store {
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the tamperlog crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
