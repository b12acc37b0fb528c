//! Canonical serialization and digests.
//!
//! Canonical values keep every map in a `BTreeMap` and every collection
//! sorted by a fixed key, so equal content always yields equal bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of the canonical JSON of `value`, truncated to `len` hex chars.
pub fn digest_prefix<T: Serialize>(value: &T, len: usize) -> Result<String, serde_json::Error> {
    let bytes = canonical_json_bytes(value)?;
    let mut hex = sha256_hex(&bytes);
    hex.truncate(len.clamp(1, 64));
    Ok(hex)
}
