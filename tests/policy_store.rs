//! Policy store integration: version history round-trips and tenant
//! isolation.

use serde_json::json;

use wardgate::policy::{
    CreatePolicyInput, MemoryPolicyStore, PolicyFilter, PolicyStatus, PolicyStore,
    UpdatePolicyInput,
};

fn definition(action: &str, priority: i64) -> serde_json::Value {
    json!({
        "version": "1.0",
        "rules": [{
            "id": "r1",
            "name": "rule one",
            "priority": priority,
            "when": {"type": "field", "field": "intent.type", "op": "exists"},
            "then": {"action": action}
        }],
        "defaultAction": "allow"
    })
}

fn input(name: &str, doc: serde_json::Value) -> CreatePolicyInput {
    CreatePolicyInput {
        name: name.into(),
        namespace: "default".into(),
        description: Some("integration".into()),
        definition: doc,
        created_by: "tests".into(),
    }
}

#[tokio::test]
async fn version_history_round_trip() {
    let store = MemoryPolicyStore::new();
    let policy = store
        .create("T1", input("p", definition("monitor", 1)))
        .await
        .unwrap();

    // A sequence of edits, each bumping the version and archiving the prior.
    for (n, action) in ["limit", "deny", "allow"].iter().enumerate() {
        store
            .update(
                &policy.id,
                "T1",
                UpdatePolicyInput {
                    definition: Some(definition(action, n as i64 + 2)),
                    change_summary: Some(format!("step {n}")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let history = store.version_history(&policy.id, "T1").await.unwrap();
    assert_eq!(history.len(), 3);
    // Strictly increasing versions; no prior row lost.
    let versions: Vec<u32> = history.iter().map(|v| v.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(history.windows(2).all(|w| w[0].version < w[1].version));

    let current = store.find_by_id(&policy.id, "T1").await.unwrap().unwrap();
    assert_eq!(current.version, 4);

    // Status-only transitions still archive and bump.
    store.publish(&policy.id, "T1").await.unwrap();
    let history = store.version_history(&policy.id, "T1").await.unwrap();
    assert_eq!(history.len(), 4);
    let current = store.find_by_id(&policy.id, "T1").await.unwrap().unwrap();
    assert_eq!(current.version, 5);
    assert_eq!(current.status, PolicyStatus::Published);
}

#[tokio::test]
async fn soft_delete_archives() {
    let store = MemoryPolicyStore::new();
    let policy = store
        .create("T1", input("p", definition("allow", 1)))
        .await
        .unwrap();
    store.publish(&policy.id, "T1").await.unwrap();
    assert_eq!(store.published_policies("T1", None).await.unwrap().len(), 1);

    store.archive(&policy.id, "T1").await.unwrap();
    // Archived policies leave the published set but remain readable.
    assert!(store.published_policies("T1", None).await.unwrap().is_empty());
    let archived = store.find_by_id(&policy.id, "T1").await.unwrap().unwrap();
    assert_eq!(archived.status, PolicyStatus::Archived);
}

#[tokio::test]
async fn tenant_isolation_leaks_nothing() {
    let store = MemoryPolicyStore::new();
    let policy = store
        .create("T1", input("secret", definition("deny", 1)))
        .await
        .unwrap();

    // Reads from another tenant: null, not a 404 diagnostic.
    assert!(store.find_by_id(&policy.id, "T2").await.unwrap().is_none());
    assert!(store
        .find_by_name("T2", "secret", "default")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .version_history(&policy.id, "T2")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .list(PolicyFilter::for_tenant("T2"))
        .await
        .unwrap()
        .is_empty());

    // The same name is free in the other tenant.
    let other = store
        .create("T2", input("secret", definition("allow", 1)))
        .await
        .unwrap();
    assert_ne!(other.id, policy.id);
}

#[tokio::test]
async fn published_listing_filters_namespace() {
    let store = MemoryPolicyStore::new();
    for (name, namespace) in [("a", "payments"), ("b", "payments"), ("c", "ops")] {
        let mut inp = input(name, definition("allow", 1));
        inp.namespace = namespace.into();
        let policy = store.create("T1", inp).await.unwrap();
        store.publish(&policy.id, "T1").await.unwrap();
    }
    assert_eq!(
        store
            .published_policies("T1", Some("payments"))
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(store.published_policies("T1", None).await.unwrap().len(), 3);
}
