// src/utils/crypto.rs
//! Hashing helpers shared by the ledger and the proof protocol.
//!
//! All digests are SHA-256 (via `ring`). Multi-field digests length-prefix each
//! field so that moving bytes between adjacent fields always changes the hash.

use ring::digest::{digest, SHA256};

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Hashes an ordered list of fields, each prefixed with its big-endian `u64` length.
///
/// `hash_fields(&[b"ab", b"c"])` and `hash_fields(&[b"a", b"bc"])` differ.
pub fn hash_fields(fields: &[&[u8]]) -> [u8; 32] {
    let capacity = fields.iter().map(|f| f.len() + 8).sum();
    let mut buf = Vec::with_capacity(capacity);
    for field in fields {
        buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
        buf.extend_from_slice(field);
    }
    hash_data(&buf)
}

/// Lowercase hex form of [`hash_fields`].
pub fn hash_fields_hex(fields: &[&[u8]]) -> String {
    hex::encode(hash_fields(fields))
}

/// Returns true when a key is empty or consists only of zero digits
/// (`""`, `"0"`, `"0x0000…"`).
pub fn is_zero_key(key: &str) -> bool {
    let trimmed = key.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    digits.chars().all(|c| c == '0')
}

/// Constant-time comparison of two hex digests.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(expected.as_bytes(), actual.as_bytes()).is_ok()
}
