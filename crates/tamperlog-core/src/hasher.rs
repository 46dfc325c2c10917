//! Canonical hashing for chain blocks.
//!
//! Hash input layout (bytes, in order):
//!   1. index as 8-byte little-endian
//!   2. timestamp as RFC 3339 UTC with nanoseconds, length-prefixed
//!   3. data as UTF-8, length-prefixed
//!   4. previous_hash as UTF-8, length-prefixed
//!   5. nonce as 8-byte little-endian
//!
//! Length prefixes are 8-byte little-endian byte counts, so no two distinct
//! field tuples share a byte sequence.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use tamperlog_contracts::Block;

/// Render a timestamp the way it is fed to the hasher.
pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// The exact bytes hashed for a block with these fields.
pub fn canonical_bytes(
    index: u64,
    timestamp: &DateTime<Utc>,
    data: &str,
    previous_hash: &str,
    nonce: u64,
) -> Vec<u8> {
    let timestamp = canonical_timestamp(timestamp);
    let mut out =
        Vec::with_capacity(8 * 5 + timestamp.len() + data.len() + previous_hash.len());
    out.extend_from_slice(&index.to_le_bytes());
    push_prefixed(&mut out, timestamp.as_bytes());
    push_prefixed(&mut out, data.as_bytes());
    push_prefixed(&mut out, previous_hash.as_bytes());
    out.extend_from_slice(&nonce.to_le_bytes());
    out
}

fn push_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// SHA-256 of `bytes` as a lowercase 64-character hex string.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a block from its individual fields.
pub fn hash_fields(
    index: u64,
    timestamp: &DateTime<Utc>,
    data: &str,
    previous_hash: &str,
    nonce: u64,
) -> String {
    digest(&canonical_bytes(index, timestamp, data, previous_hash, nonce))
}

/// Recompute a block's hash from its stored fields, ignoring its stored
/// `hash`.
pub fn hash_block(block: &Block) -> String {
    hash_fields(
        block.index,
        &block.timestamp,
        &block.data,
        &block.previous_hash,
        block.nonce,
    )
}

/// True if `hash` starts with `difficulty` hex zeros.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    hash.bytes().take(difficulty as usize).filter(|b| *b == b'0').count()
        == difficulty as usize
}

/// Search for the first nonce whose hash meets `difficulty`.
///
/// Returns `(nonce, hash)`. With difficulty 0 this is `(0, hash)`.
pub fn mine(
    index: u64,
    timestamp: &DateTime<Utc>,
    data: &str,
    previous_hash: &str,
    difficulty: u32,
) -> (u64, String) {
    let mut nonce = 0u64;
    loop {
        let hash = hash_fields(index, timestamp, data, previous_hash, nonce);
        if meets_difficulty(&hash, difficulty) {
            return (nonce, hash);
        }
        nonce += 1;
    }
}
