//! # Wardgate: Runtime Governance for Autonomous Agents
//!
//! Wardgate sits between an agent and its side-effects. Before an agent
//! performs any observable action, the engine identifies it, computes its
//! current trust, evaluates the tenant's policies, returns one of
//! `{allow, deny, escalate, limit, monitor, terminate}`, and appends a
//! tamper-evident proof record to the agent's hash-linked chain.
//!
//! ## Core Concepts
//!
//! - **Trust**: a bounded score (0..=1000) and band (T0..T5) derived from
//!   behavioral, compliance, identity, and context signals with time decay,
//!   clamped by certification, observability, and deployment ceilings
//! - **Policies**: versioned JSON documents evaluated deterministically over
//!   a typed condition tree, with an embedded expression DSL
//! - **Security gate**: tier-indexed controls (binding proofs, attestations,
//!   pairwise ids, token TTLs, synchronous revocation)
//! - **Escalations**: decisions suspended pending a named authority, with
//!   timeouts and a full audit trail
//! - **Proof chain**: an append-only, hash-linked event log per agent, with
//!   Merkle-batched inclusion proofs
//!
//! ## Quick Start
//!
//! ```
//! use wardgate::decision::{DecisionCoordinator, DecisionRequest, Intent};
//! use wardgate::policy::CreatePolicyInput;
//! use wardgate::security::AccessToken;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = DecisionCoordinator::in_memory();
//!
//! // Author and publish a policy.
//! let policy = engine
//!     .create_policy(
//!         "tenant-1",
//!         CreatePolicyInput {
//!             name: "payments-guard".into(),
//!             namespace: "default".into(),
//!             description: None,
//!             definition: json!({
//!                 "version": "1.0",
//!                 "rules": [{
//!                     "id": "deny-low-trust",
//!                     "name": "payments need T4",
//!                     "priority": 10,
//!                     "when": {
//!                         "type": "compound",
//!                         "operator": "and",
//!                         "conditions": [
//!                             {"type": "field", "field": "intent.type",
//!                              "op": "equals", "value": "payment"},
//!                             {"type": "trust", "band": "T4", "op": "less_than"}
//!                         ]
//!                     },
//!                     "then": {"action": "deny", "reason": "requires T4"}
//!                 }],
//!                 "defaultAction": "allow"
//!             }),
//!             created_by: "admin".into(),
//!         },
//!     )
//!     .await
//!     .unwrap();
//! engine.publish_policy(&policy.id, "tenant-1").await.unwrap();
//!
//! // Submit an intent.
//! let now = chrono::Utc::now();
//! let reply = engine
//!     .decide(DecisionRequest {
//!         tenant_id: "tenant-1".into(),
//!         agent_id: "ag_A".into(),
//!         intent: Intent {
//!             id: "int-1".into(),
//!             intent_type: "payment".into(),
//!             description: None,
//!             context: json!({"amount": 5000}),
//!         },
//!         request_binding: None,
//!         access_token: AccessToken {
//!             token: "tok".into(),
//!             issued_at: now,
//!             expires_at: now + chrono::Duration::minutes(30),
//!             confirmation: None,
//!         },
//!         attestation: None,
//!         pairwise_id: None,
//!         data_sensitivity: Default::default(),
//!         deadline_ms: 5_000,
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(reply.action, wardgate::types::ActionKind::Deny);
//! assert_eq!(reply.reason.as_deref(), Some("requires T4"));
//! # engine.shutdown().await.unwrap();
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] - Bands, actions, observability classes, shared vocabulary
//! - [`dsl`] - Expression DSL (lexer, parser, evaluator)
//! - [`policy`] - Conditions, definitions, store, loader, evaluator
//! - [`trust`] - Signals, scoring, decay, effective trust
//! - [`security`] - Tier requirements and the pre-request gate
//! - [`escalation`] - Suspended decisions and their state machine
//! - [`proof`] - Hash-linked proof chain and Merkle batching
//! - [`decision`] - The request pipeline tying it all together
//! - [`config`] - Configuration surface
//! - [`errors`] - Boundary error taxonomy

pub mod canonical;
pub mod config;
pub mod decision;
pub mod dsl;
pub mod errors;
pub mod escalation;
pub mod policy;
pub mod proof;
pub mod security;
pub mod trust;
pub mod types;
