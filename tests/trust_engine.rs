//! Trust engine integration: the update protocol end to end.

mod common;

use serde_json::json;

use common::{signal, success_signal};
use wardgate::decision::DecisionCoordinator;
use wardgate::proof::ProofKind;
use wardgate::types::TrustBand;

#[tokio::test]
async fn signals_append_history_and_trust_delta_proofs() {
    let engine = DecisionCoordinator::in_memory();

    let first = engine
        .ingest_signal("T1", success_signal("ag_A", 10))
        .await
        .unwrap();
    assert!(first.accepted);
    assert!(first.score > first.previous_score);

    let second = engine
        .ingest_signal(
            "T1",
            signal("ag_A", "policy_violation", 1, json!({"severity": "critical"})),
        )
        .await
        .unwrap();
    assert!(second.score < first.score, "critical violation must cost trust");

    let history = engine.trust().store().history("ag_A").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].reason, "signal:execution_success");
    assert_eq!(history[1].reason, "signal:policy_violation");
    assert!(history[1].delta < 0);

    // Each accepted signal sealed one trust_delta proof event.
    let events = engine.ledger().events_for_entity("ag_A").await.unwrap();
    let deltas: Vec<_> = events
        .iter()
        .filter(|e| e.kind == ProofKind::TrustDelta)
        .collect();
    assert_eq!(deltas.len(), 2);
    for pair in events.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn band_change_is_flagged_in_the_proof_payload() {
    let engine = DecisionCoordinator::in_memory();

    // The first meaningful signal jumps the agent out of T0.
    let outcome = engine
        .ingest_signal("T1", success_signal("ag_B", 50))
        .await
        .unwrap();
    assert!(outcome.band_changed);
    assert!(outcome.band > TrustBand::T0);

    let events = engine.ledger().events_for_entity("ag_B").await.unwrap();
    let delta = events
        .iter()
        .find(|e| e.kind == ProofKind::TrustDelta)
        .expect("trust_delta sealed");
    assert_eq!(
        delta.payload["tierChanged"]["from"],
        json!(TrustBand::T0.to_string())
    );
    assert_eq!(
        delta.payload["tierChanged"]["to"],
        json!(outcome.band.to_string())
    );
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn signals_are_not_transferable_across_agents() {
    let engine = DecisionCoordinator::in_memory();
    engine
        .ingest_signal("T1", success_signal("ag_C", 100))
        .await
        .unwrap();

    let other = engine.trust().store().get_profile("ag_D").await.unwrap();
    assert!(other.is_none(), "signals must only affect their entity");
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn verification_signal_raises_identity_component() {
    let engine = DecisionCoordinator::in_memory();
    let before = engine
        .ingest_signal("T1", success_signal("ag_E", 10))
        .await
        .unwrap();
    let after = engine
        .ingest_signal(
            "T1",
            signal("ag_E", "verification", 1, json!({"level": "organization"})),
        )
        .await
        .unwrap();
    assert!(after.score > before.score);
    engine.shutdown().await.unwrap();
}
