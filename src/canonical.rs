//! Canonical JSON serialization and SHA-256 hashing.
//!
//! Policy checksums and proof-chain hashes must be reproducible across
//! independent implementations, so every payload is normalized to sorted key
//! order before hashing.

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Serialize a JSON value with deterministic (recursively sorted) key
/// ordering.
#[must_use]
pub fn canonical_json(value: &serde_json::Value) -> String {
    let normalized = normalize_key_order(value);
    serde_json::to_string(&normalized).expect("canonical_json: serialization cannot fail")
}

/// Hex-encoded SHA-256 of a string.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Hex-encoded SHA-256 over raw bytes.
#[must_use]
pub fn sha256_hex_bytes(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex_encode(&hasher.finalize())
}

/// Encode bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Recursively rebuild objects so map keys serialize in sorted order.
fn normalize_key_order(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let rebuilt: serde_json::Map<String, serde_json::Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), normalize_key_order(v)))
                .collect();
            serde_json::Value::Object(rebuilt)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(normalize_key_order).collect())
        }
        other => other.clone(),
    }
}
