//! End-to-end decision pipeline scenarios.

mod common;

use serde_json::json;

use common::{payments_guard, publish, request, signal, success_signal};
use wardgate::decision::DecisionCoordinator;
use wardgate::escalation::{EscalationStatus, Resolution};
use wardgate::proof::{verify, ProofKind};
use wardgate::types::{ActionKind, TrustBand};

#[tokio::test]
async fn denial_by_insufficient_trust() {
    let engine = DecisionCoordinator::in_memory();
    publish(&engine, "T1", "payments-guard", payments_guard()).await;

    // A couple of successes put the agent into a low band, well below T4.
    engine
        .ingest_signal("T1", success_signal("ag_A", 2))
        .await
        .unwrap();

    let reply = engine
        .decide(request("T1", "ag_A", "payment", json!({"amount": 5000})))
        .await
        .unwrap();

    assert_eq!(reply.action, ActionKind::Deny);
    assert_eq!(reply.reason.as_deref(), Some("requires T4"));
    assert!(reply.effective_trust.band < TrustBand::T4);
    assert!(!reply.proof_hash.is_empty());

    // One intent_received and one decision_made, hash-linked.
    let events = engine.ledger().events_for_entity("ag_A").await.unwrap();
    let kinds: Vec<ProofKind> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&ProofKind::IntentReceived));
    assert!(kinds.contains(&ProofKind::DecisionMade));
    for pair in events.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }

    let report = verify(engine.ledger().as_ref(), &reply.proof_hash)
        .await
        .unwrap();
    assert!(report.valid);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn allow_with_monitoring_after_trust_upgrade() {
    let engine = DecisionCoordinator::in_memory();
    publish(
        &engine,
        "T1",
        "monitor-large-payments",
        json!({
            "version": "1.0",
            "rules": [{
                "id": "monitor-large",
                "name": "monitor large payments",
                "priority": 10,
                "when": {
                    "type": "compound",
                    "operator": "and",
                    "conditions": [
                        {"type": "field", "field": "intent.type", "op": "equals", "value": "payment"},
                        {"type": "field", "field": "intent.amount", "op": "greater_than_or_equal", "value": 1000}
                    ]
                },
                "then": {"action": "monitor", "constraints": {"sample": "100%"}}
            }],
            "defaultAction": "allow"
        }),
    )
    .await;

    // Register the agent with inspectable internals so the observability
    // ceiling (WhiteBox, 900) does not pin it below T4.
    engine
        .trust()
        .store()
        .register_agent(wardgate::trust::AgentRecord {
            id: "ag_A".into(),
            tenant_id: "T1".into(),
            identity: wardgate::types::AgentIdentity {
                registry: "reg".into(),
                organization: "acme".into(),
                agent_class: "payments".into(),
                competence: wardgate::types::CompetenceLevel::Expert,
                domains: vec!["payments".into()],
            },
            metadata: json!({"source_code_url": "https://example.com/acme/payments"}),
            status: wardgate::trust::AgentStatus::Active,
        })
        .await
        .unwrap();

    // Upgrade the agent: a long success history plus identity and context
    // facts pushes the effective band to T4.
    engine
        .ingest_signal("T1", success_signal("ag_A", 100))
        .await
        .unwrap();
    engine
        .ingest_signal("T1", success_signal("ag_A", 100))
        .await
        .unwrap();
    engine
        .ingest_signal(
            "T1",
            signal("ag_A", "verification", 1, json!({"level": "enterprise"})),
        )
        .await
        .unwrap();
    engine
        .ingest_signal(
            "T1",
            signal(
                "ag_A",
                "deployment",
                1,
                json!({"environment": "staging", "tls": true, "isolated": true}),
            ),
        )
        .await
        .unwrap();

    let reply = engine
        .decide(request("T1", "ag_A", "payment", json!({"amount": 2500})))
        .await
        .unwrap();

    assert_eq!(reply.action, ActionKind::Monitor);
    assert_eq!(
        reply.constraints.as_ref().and_then(|c| c.get("sample")),
        Some(&json!("100%"))
    );
    assert!(reply.effective_trust.band >= TrustBand::T4);

    // Small payments pass untouched.
    let reply = engine
        .decide(request("T1", "ag_A", "payment", json!({"amount": 50})))
        .await
        .unwrap();
    assert_eq!(reply.action, ActionKind::Allow);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn escalation_with_timeout_auto_deny() {
    let engine = DecisionCoordinator::in_memory();
    publish(
        &engine,
        "T1",
        "escalate-transfers",
        json!({
            "version": "1.0",
            "rules": [{
                "id": "escalate-all-transfers",
                "name": "transfers go to ops",
                "priority": 1,
                "when": {"type": "field", "field": "intent.type", "op": "equals", "value": "transfer"},
                "then": {
                    "action": "escalate",
                    "reason": "transfers require sign-off",
                    "escalation": {"to": "ops", "timeout": "5m", "autoDenyOnTimeout": true}
                }
            }],
            "defaultAction": "allow"
        }),
    )
    .await;

    let reply = engine
        .decide(request("T1", "ag_A", "transfer", json!({"amount": 9000})))
        .await
        .unwrap();
    assert_eq!(reply.action, ActionKind::Escalate);
    let escalation_id = reply.escalation_id.expect("escalation id");

    let pending = engine
        .escalations()
        .get(&escalation_id, "T1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, EscalationStatus::Pending);
    assert_eq!(pending.escalated_to, "ops");

    // Nobody resolves; the sweep runs after the deadline.
    let later = pending.timeout_at + chrono::Duration::minutes(1);
    let timed_out = engine
        .escalations()
        .process_timeouts_at(later)
        .await
        .unwrap();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].timeout_action(), ActionKind::Deny);

    let stored = engine
        .escalations()
        .get(&escalation_id, "T1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EscalationStatus::Timeout);

    let trail = engine
        .escalations()
        .audit_trail(&escalation_id, "T1")
        .await
        .unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["created", "timeout"]);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn escalation_approval_re_enters_as_allow() {
    let engine = DecisionCoordinator::in_memory();
    publish(
        &engine,
        "T1",
        "escalate-deletes",
        json!({
            "version": "1.0",
            "rules": [{
                "id": "escalate-deletes",
                "name": "deletes need approval",
                "priority": 1,
                "when": {"type": "field", "field": "intent.type", "op": "equals", "value": "delete"},
                "then": {
                    "action": "escalate",
                    "escalation": {"to": "ops", "timeout": "10m"},
                    "constraints": {"scope": "single-record"}
                }
            }],
            "defaultAction": "allow"
        }),
    )
    .await;

    let reply = engine
        .decide(request("T1", "ag_B", "delete", json!({"record": "r-9"})))
        .await
        .unwrap();
    let escalation_id = reply.escalation_id.unwrap();

    let resolved = engine
        .resolve_escalation(&escalation_id, "T1", Resolution::Approved, "alice", None)
        .await
        .unwrap();
    assert_eq!(resolved.action, ActionKind::Allow);
    // Constraints frozen at escalation time come back with the approval.
    assert_eq!(
        resolved.constraints.as_ref().and_then(|c| c.get("scope")),
        Some(&json!("single-record"))
    );

    let rejected_again = engine
        .resolve_escalation(&escalation_id, "T1", Resolution::Rejected, "bob", None)
        .await;
    assert!(rejected_again.is_err(), "conflicting re-resolution must fail");
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn timeout_sweep_counts_and_seals_proofs() {
    let engine = DecisionCoordinator::in_memory();
    publish(
        &engine,
        "T1",
        "escalate-everything",
        json!({
            "version": "1.0",
            "rules": [{
                "id": "esc",
                "name": "escalate all",
                "priority": 1,
                "when": {"type": "field", "field": "intent.type", "op": "exists"},
                "then": {
                    "action": "escalate",
                    "escalation": {"to": "ops", "timeout": 0, "autoDenyOnTimeout": true}
                }
            }],
            "defaultAction": "allow"
        }),
    )
    .await;

    engine
        .decide(request("T1", "ag_C", "anything", json!({})))
        .await
        .unwrap();

    // Zero-minute timeout: already due.
    let count = engine.process_timeouts().await.unwrap();
    assert_eq!(count, 1);
    // Idempotent.
    assert_eq!(engine.process_timeouts().await.unwrap(), 0);

    let events = engine.ledger().events_for_entity("ag_C").await.unwrap();
    let decisions: Vec<_> = events
        .iter()
        .filter(|e| e.kind == ProofKind::DecisionMade)
        .collect();
    // One for the escalate reply, one for the timeout materialisation.
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[1].payload["action"], json!("deny"));
    assert_eq!(decisions[1].payload["timedOut"], json!(true));
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_policy_set_allows() {
    let engine = DecisionCoordinator::in_memory();
    let reply = engine
        .decide(request("T1", "ag_D", "read", json!({})))
        .await
        .unwrap();
    assert_eq!(reply.action, ActionKind::Allow);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn deadline_overrun_surfaces_timeout() {
    let engine = DecisionCoordinator::in_memory();
    let mut req = request("T1", "ag_E", "read", json!({}));
    req.deadline_ms = 1;
    // A 1ms deadline may or may not survive the first stages; what must
    // never happen is a non-timeout failure.
    match engine.decide(req).await {
        Ok(reply) => assert_eq!(reply.action, ActionKind::Allow),
        Err(err) => assert!(matches!(
            err,
            wardgate::decision::DecisionError::DeadlineExceeded { .. }
        )),
    }
    engine.shutdown().await.unwrap();
}
