//! Shared helpers for the integration suite.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use wardgate::decision::{DecisionCoordinator, DecisionRequest, Intent};
use wardgate::policy::CreatePolicyInput;
use wardgate::security::AccessToken;
use wardgate::trust::SignalInput;

/// A short-lived bearer token with no confirmation claim.
pub fn token(ttl_minutes: i64) -> AccessToken {
    let now = Utc::now();
    AccessToken {
        token: format!("tok-{}", uuid::Uuid::new_v4()),
        issued_at: now,
        expires_at: now + Duration::minutes(ttl_minutes),
        confirmation: None,
    }
}

/// A decision request with sane defaults for `tenant`/`agent`.
pub fn request(tenant: &str, agent: &str, intent_type: &str, context: Value) -> DecisionRequest {
    DecisionRequest {
        tenant_id: tenant.into(),
        agent_id: agent.into(),
        intent: Intent {
            id: format!("int-{}", uuid::Uuid::new_v4()),
            intent_type: intent_type.into(),
            description: None,
            context,
        },
        request_binding: None,
        access_token: token(30),
        attestation: None,
        pairwise_id: None,
        data_sensitivity: Default::default(),
        deadline_ms: 10_000,
    }
}

/// Create **and publish** a policy from a raw definition document.
pub async fn publish(
    engine: &DecisionCoordinator,
    tenant: &str,
    name: &str,
    definition: Value,
) -> String {
    let policy = engine
        .create_policy(
            tenant,
            CreatePolicyInput {
                name: name.into(),
                namespace: "default".into(),
                description: None,
                definition,
                created_by: "tests".into(),
            },
        )
        .await
        .expect("create policy");
    engine
        .publish_policy(&policy.id, tenant)
        .await
        .expect("publish policy");
    policy.id
}

/// A guard policy that denies payments below T4.
pub fn payments_guard() -> Value {
    json!({
        "version": "1.0",
        "rules": [{
            "id": "deny-low-trust",
            "name": "payments need T4",
            "priority": 10,
            "when": {
                "type": "compound",
                "operator": "and",
                "conditions": [
                    {"type": "field", "field": "intent.type", "op": "equals", "value": "payment"},
                    {"type": "trust", "band": "T4", "op": "less_than"}
                ]
            },
            "then": {"action": "deny", "reason": "requires T4"}
        }],
        "defaultAction": "allow"
    })
}

/// One success signal worth `value` executions.
pub fn success_signal(agent: &str, value: i64) -> SignalInput {
    SignalInput {
        entity_id: agent.into(),
        signal_type: "execution_success".into(),
        value,
        weight: Some(1.0),
        source: "it-runtime".into(),
        metadata: None,
        idempotency_key: None,
    }
}

/// Metadata-bearing signal of an arbitrary kind.
pub fn signal(agent: &str, kind: &str, value: i64, metadata: Value) -> SignalInput {
    SignalInput {
        entity_id: agent.into(),
        signal_type: kind.into(),
        value,
        weight: Some(1.0),
        source: "it-runtime".into(),
        metadata: Some(metadata),
        idempotency_key: None,
    }
}
