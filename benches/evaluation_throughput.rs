//! Throughput of the hot, CPU-only evaluation paths.

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use wardgate::dsl;
use wardgate::policy::{
    EntityContext, EnvironmentContext, EvaluationContext, IntentContext, Policy, PolicyDefinition,
    PolicyEvaluator, PolicyStatus,
};
use wardgate::types::TrustBand;

fn sample_policy() -> Policy {
    let doc = json!({
        "version": "1.0",
        "rules": [
            {
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
            },
            {
                "id": "monitor-large",
                "name": "monitor large amounts",
                "priority": 20,
                "when": {"type": "field", "field": "intent.amount", "op": "greater_than_or_equal", "value": 1000},
                "then": {"action": "monitor"}
            }
        ],
        "defaultAction": "allow"
    });
    let now = chrono::Utc::now();
    Policy {
        id: "pol-bench".into(),
        tenant_id: "T1".into(),
        name: "bench".into(),
        namespace: "default".into(),
        description: None,
        version: 1,
        status: PolicyStatus::Published,
        checksum: wardgate::policy::compute_checksum(&doc),
        definition: PolicyDefinition::from_value(&doc).unwrap(),
        created_by: "bench".into(),
        created_at: now,
        updated_at: now,
        published_at: Some(now),
    }
}

fn sample_context() -> EvaluationContext {
    EvaluationContext {
        intent: IntentContext {
            id: "int-1".into(),
            intent_type: "payment".into(),
            description: None,
            attributes: json!({"amount": 2500, "currency": "EUR"}),
        },
        entity: EntityContext {
            id: "ag_A".into(),
            entity_type: "agent".into(),
            trust_score: 700,
            trust_band: TrustBand::T4,
            attributes: json!({}),
        },
        environment: EnvironmentContext {
            timestamp: chrono::Utc::now(),
            timezone: None,
            request_id: "req-bench".into(),
        },
        custom: None,
    }
}

fn bench_policy_evaluation(c: &mut Criterion) {
    let policies = vec![sample_policy()];
    let context = sample_context();
    let evaluator = PolicyEvaluator::new();
    c.bench_function("evaluate_policy_set", |b| {
        b.iter(|| evaluator.evaluate(std::hint::black_box(&policies), &context, None));
    });
}

fn bench_dsl(c: &mut Criterion) {
    let source = "user.role IN ['admin','supervisor'] OR trust.score >= 800";
    c.bench_function("dsl_compile", |b| {
        b.iter(|| dsl::compile(std::hint::black_box(source)).unwrap());
    });

    let compiled = dsl::compile(source).unwrap();
    let ctx = json!({"user": {"role": "user"}, "trust": {"score": 850}});
    c.bench_function("dsl_evaluate_compiled", |b| {
        b.iter(|| compiled.evaluate(std::hint::black_box(&ctx)));
    });
}

criterion_group!(benches, bench_policy_evaluation, bench_dsl);
criterion_main!(benches);
