//! # tamperlog-verify
//!
//! Integrity verification for the tamperlog audit chain.
//!
//! [`ChainVerifier`] re-walks a stored block sequence, recomputes every hash
//! and link, and returns an [`IntegrityReport`](tamperlog_contracts::IntegrityReport)
//! listing every anomaly in index order. Verification is read-only and
//! treats tampering as a result, never as an error.

pub mod engine;

pub use engine::ChainVerifier;

// ── Tests ─────────────────────────────────────────────────────────────────────
