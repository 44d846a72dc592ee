use evoke_core::errors::BatchError;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::serde::to_canonical_json_bytes;

/// Computes a stable SHA256 hash for the provided serializable value.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, BatchError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(content_hash(&bytes))
}

/// SHA256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
