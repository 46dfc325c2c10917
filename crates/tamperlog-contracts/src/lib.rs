//! # tamperlog-contracts
//!
//! Shared types for the tamperlog audit chain.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod block;
pub mod error;
pub mod outcome;
pub mod report;

pub use block::Block;
pub use error::{LedgerError, LedgerResult};
pub use outcome::{ChainExport, Page, RebuildOutcome, RepairOutcome};
pub use report::{AnomalyKind, IntegrityReport, TamperedBlock};
