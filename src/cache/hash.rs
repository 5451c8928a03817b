//! Content hashing for cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::storage::TableDescriptor;

/// SHA-256 of a value's JSON serialization, as 64 lowercase hex characters.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Cache key for the catalog introspected from these descriptors.
pub fn schema_key(descriptors: &[TableDescriptor]) -> Result<String, serde_json::Error> {
    Ok(format!("catalog:{}", compute_hash(&descriptors)?))
}
