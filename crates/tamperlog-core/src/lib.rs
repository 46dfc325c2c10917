//! # tamperlog-core
//!
//! The append protocol for the tamperlog audit chain.
//!
//! This crate provides:
//! - The canonical block hasher (`hasher`)
//! - The two trait seams (`BlockStore`, `Verifier`)
//! - The `ChainEngine` that serializes every write to the chain
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tamperlog_core::{ChainEngine, ChainOptions};
//!
//! let engine = ChainEngine::new(store, verifier, ChainOptions::default());
//! engine.initialize()?;
//! engine.record("User alice logged in");
//! let report = engine.verify()?;
//! ```

pub mod engine;
pub mod hasher;
pub mod traits;

pub use engine::{suggests_rebuild, ChainEngine, ChainOptions, MAX_DIFFICULTY};
pub use traits::{BlockStore, BlockStream, Verifier};
