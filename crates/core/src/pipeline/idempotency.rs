//! Deduplication keys for request submission.

use sha2::{Digest, Sha256};

/// Hex SHA-256 over the owner and the canonical JSON of `payload`.
///
/// `serde_json::Value` objects keep their keys sorted, so two payloads that
/// differ only in key order hash the same.
pub fn idempotency_key(owner_id: &str, payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(payload.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
