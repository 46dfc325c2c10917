//! # tamperlog-store
//!
//! `BlockStore` implementations for the tamperlog audit chain.
//!
//! - [`InMemoryBlockStore`] — volatile, copy-on-write snapshots; used by
//!   tests, demos, and offline verification of exported logs.
//! - [`FileBlockStore`] — durable JSON Lines file that is re-read on every
//!   access so direct edits to the file are detectable.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tamperlog_store::FileBlockStore;
//!
//! let store = FileBlockStore::open("data/chain.jsonl")?;
//! let engine = ChainEngine::new(Box::new(store), verifier, ChainOptions::default());
//! ```

pub mod file;
pub mod memory;

pub use file::FileBlockStore;
pub use memory::InMemoryBlockStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
