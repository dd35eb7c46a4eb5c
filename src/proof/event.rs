//! Proof event type and its hash contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_json, sha256_hex};

/// `prev_hash` of the first event in every entity chain: 32 zero bytes,
/// hex-encoded.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The kind of state transition a proof event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    IntentReceived,
    DecisionMade,
    TrustDelta,
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    IncidentDetected,
    RollbackInitiated,
    ComponentRegistered,
    ComponentUpdated,
}

impl ProofKind {
    /// Wire label, e.g. `decision_made`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProofKind::IntentReceived => "intent_received",
            ProofKind::DecisionMade => "decision_made",
            ProofKind::TrustDelta => "trust_delta",
            ProofKind::ExecutionStarted => "execution_started",
            ProofKind::ExecutionCompleted => "execution_completed",
            ProofKind::ExecutionFailed => "execution_failed",
            ProofKind::IncidentDetected => "incident_detected",
            ProofKind::RollbackInitiated => "rollback_initiated",
            ProofKind::ComponentRegistered => "component_registered",
            ProofKind::ComponentUpdated => "component_updated",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, hash-linked record in an entity's proof chain.
///
/// The hash covers every field:
/// `SHA256(id || tenant_id || entity_id || kind || canonical(payload) ||
/// timestamp || prev_hash)`, with the timestamp in RFC 3339 and the payload
/// canonicalised to sorted key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEvent {
    pub id: String,
    pub tenant_id: String,
    pub entity_id: String,
    pub kind: ProofKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl ProofEvent {
    /// Recompute the hash from this event's fields.
    #[must_use]
    pub fn computed_hash(&self) -> String {
        hash_fields(
            &self.id,
            &self.tenant_id,
            &self.entity_id,
            self.kind,
            &self.payload,
            self.timestamp,
            &self.prev_hash,
        )
    }

    /// Whether the stored hash matches the recomputed one.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.hash == self.computed_hash()
    }
}

/// Compute a proof-event hash from its constituent fields.
#[must_use]
pub fn hash_fields(
    id: &str,
    tenant_id: &str,
    entity_id: &str,
    kind: ProofKind,
    payload: &serde_json::Value,
    timestamp: DateTime<Utc>,
    prev_hash: &str,
) -> String {
    let preimage = format!(
        "{id}{tenant_id}{entity_id}{kind}{payload}{ts}{prev_hash}",
        kind = kind.as_str(),
        payload = canonical_json(payload),
        ts = timestamp.to_rfc3339(),
    );
    sha256_hex(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProofEvent {
        let timestamp = "2026-01-20T10:00:00Z".parse().unwrap();
        let payload = json!({"b": 2, "a": 1});
        let hash = hash_fields(
            "ev-1",
            "t1",
            "ag_A",
            ProofKind::IntentReceived,
            &payload,
            timestamp,
            GENESIS_HASH,
        );
        ProofEvent {
            id: "ev-1".into(),
            tenant_id: "t1".into(),
            entity_id: "ag_A".into(),
            kind: ProofKind::IntentReceived,
            payload,
            timestamp,
            prev_hash: GENESIS_HASH.into(),
            hash,
        }
    }

    #[test]
    fn hash_is_reproducible() {
        let event = sample();
        assert!(event.is_intact());
        assert_eq!(event.hash.len(), 64);
    }

    #[test]
    fn payload_key_order_does_not_change_hash() {
        let event = sample();
        let mut reordered = event.clone();
        reordered.payload = json!({"a": 1, "b": 2});
        assert_eq!(event.computed_hash(), reordered.computed_hash());
    }

    #[test]
    fn mutation_breaks_integrity() {
        let mut event = sample();
        event.payload = json!({"a": 1, "b": 3});
        assert!(!event.is_intact());
    }

    #[test]
    fn kind_labels_round_trip() {
        let json = serde_json::to_string(&ProofKind::DecisionMade).unwrap();
        assert_eq!(json, r#""decision_made""#);
        let parsed: ProofKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ProofKind::DecisionMade);
    }
}
