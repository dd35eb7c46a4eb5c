//! The decision coordinator: one request in, one governed decision out.
//!
//! Pipeline per request:
//!
//! ```text
//! received → security pre-check → [deny | continue] → load policies
//!          → trust lookup → evaluate → {allow|deny|limit|monitor|escalate}
//!          → proof emit → reply
//! ```
//!
//! Every stage boundary observes the request deadline and aborts with a
//! `TIMEOUT` error past it; in-flight I/O is cancelled with the stage. The
//! serialisation primitive protecting per-agent chains is the proof chain's
//! internal per-entity lock — no coordinator lock is held across I/O.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::WardgateConfig;
use crate::errors::ErrorCode;
use crate::escalation::{
    ActorType, CreateEscalationRequest, EscalationCoordinator, EscalationError, EscalationPriority,
    EscalationStore, MemoryEscalationStore, Resolution, ResolveRequest,
};
use crate::policy::{
    CreatePolicyInput, EntityContext, EnvironmentContext, EvaluationContext, EvaluationOutcome,
    IntentContext, LoaderError, MemoryPolicyStore, MemorySharedCache, Policy, PolicyEvaluator,
    PolicyLoader, PolicyStore, PolicyStoreError, SharedCache, UpdatePolicyInput,
};
use crate::proof::{
    MemoryProofLedger, MemorySink, ProofChain, ProofChainError, ProofKind, ProofLedger, ProofSink,
};
use crate::security::{
    is_high_value, AllowAllIntrospector, AttestationVerifier, DigestAttestationVerifier,
    GateError, MemoryRevocationList, RevocationChecker, SecurityCredentials, SecurityGate,
    TokenIntrospector,
};
use crate::trust::{
    DecaySchedule, DeploymentContext, SignalInput, SignalOutcome, SignalRateLimiter, TrustEngine,
    TrustError, TrustStore,
};
use crate::trust::store::MemoryTrustStore;
use crate::types::{ActionKind, CompetenceLevel, ObservabilityClass};

use super::request::{DecisionReply, DecisionRequest, TrustSummary};

/// Errors the decision pipeline can surface to callers. Gate denials that
/// represent *decisions* (tier requirements unmet) come back as `deny`
/// replies, not errors; only malformed or unauthorized requests error.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecisionError {
    /// The request deadline elapsed at `stage`.
    #[error("request deadline exceeded during {stage}")]
    #[diagnostic(code(wardgate::decision::timeout))]
    DeadlineExceeded { stage: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyStoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Escalation(#[from] EscalationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Proof(#[from] ProofChainError),
}

impl From<LoaderError> for DecisionError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::Store(inner) => DecisionError::Policy(inner),
        }
    }
}

impl crate::errors::BoundaryError for DecisionError {
    fn code(&self) -> ErrorCode {
        match self {
            DecisionError::DeadlineExceeded { .. } => ErrorCode::Timeout,
            DecisionError::Gate(err) => crate::errors::BoundaryError::code(err),
            DecisionError::Trust(err) => crate::errors::BoundaryError::code(err),
            DecisionError::Policy(err) => crate::errors::BoundaryError::code(err),
            DecisionError::Escalation(err) => crate::errors::BoundaryError::code(err),
            DecisionError::Proof(_) => ErrorCode::Internal,
        }
    }
}

/// Builder for [`DecisionCoordinator`]. Every collaborator defaults to the
/// in-memory implementation; inject real backends as needed.
pub struct CoordinatorBuilder {
    config: WardgateConfig,
    policy_store: Option<Arc<dyn PolicyStore>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    trust_store: Option<Arc<dyn TrustStore>>,
    escalation_store: Option<Arc<dyn EscalationStore>>,
    ledger: Option<Arc<dyn ProofLedger>>,
    sink: Option<Arc<dyn ProofSink>>,
    introspector: Option<Arc<dyn TokenIntrospector>>,
    revocations: Option<Arc<dyn RevocationChecker>>,
    attestations: Option<Arc<dyn AttestationVerifier>>,
    deployment: DeploymentContext,
}

impl CoordinatorBuilder {
    #[must_use]
    pub fn new(config: WardgateConfig) -> Self {
        Self {
            config,
            policy_store: None,
            shared_cache: None,
            trust_store: None,
            escalation_store: None,
            ledger: None,
            sink: None,
            introspector: None,
            revocations: None,
            attestations: None,
            deployment: DeploymentContext::default(),
        }
    }

    #[must_use]
    pub fn policy_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.policy_store = Some(store);
        self
    }

    #[must_use]
    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.trust_store = Some(store);
        self
    }

    #[must_use]
    pub fn escalation_store(mut self, store: Arc<dyn EscalationStore>) -> Self {
        self.escalation_store = Some(store);
        self
    }

    #[must_use]
    pub fn proof_ledger(mut self, ledger: Arc<dyn ProofLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn proof_sink(mut self, sink: Arc<dyn ProofSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn introspector(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    #[must_use]
    pub fn revocations(mut self, revocations: Arc<dyn RevocationChecker>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    #[must_use]
    pub fn attestation_verifier(mut self, verifier: Arc<dyn AttestationVerifier>) -> Self {
        self.attestations = Some(verifier);
        self
    }

    /// Per-deployment trust ceiling.
    #[must_use]
    pub fn deployment(mut self, deployment: DeploymentContext) -> Self {
        self.deployment = deployment;
        self
    }

    /// Wire everything together. Must run inside a Tokio runtime — the
    /// proof chain spawns its delivery worker here.
    #[must_use]
    pub fn build(self) -> DecisionCoordinator {
        let config = self.config;
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(MemoryProofLedger::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(MemorySink::new()));
        let proof = Arc::new(ProofChain::new(
            Arc::clone(&ledger),
            sink,
            config.proof.batch_size,
            config.proof.queue_capacity,
        ));

        let trust_store = self
            .trust_store
            .unwrap_or_else(|| Arc::new(MemoryTrustStore::new()));
        let trust = TrustEngine::new(
            trust_store,
            SignalRateLimiter::new(config.trust.signal_rate_limit_per_hour),
            DecaySchedule::new(config.trust.decay_half_life_days),
            Some(Arc::clone(&proof)),
        );

        let policy_store = self
            .policy_store
            .unwrap_or_else(|| Arc::new(MemoryPolicyStore::new()));
        let shared_cache = self
            .shared_cache
            .unwrap_or_else(|| Arc::new(MemorySharedCache::new()));
        let loader = PolicyLoader::new(
            Arc::clone(&policy_store),
            shared_cache,
            Duration::from_secs(config.cache.ttl_seconds),
        );

        let gate = SecurityGate::new(
            self.introspector
                .unwrap_or_else(|| Arc::new(AllowAllIntrospector)),
            self.revocations
                .unwrap_or_else(|| Arc::new(MemoryRevocationList::new())),
            self.attestations
                .unwrap_or_else(|| Arc::new(DigestAttestationVerifier)),
            config.security.tier_token_ttl_minutes,
        );

        let escalations = EscalationCoordinator::new(
            self.escalation_store
                .unwrap_or_else(|| Arc::new(MemoryEscalationStore::new())),
            config.escalation.default_timeout_minutes,
        );

        DecisionCoordinator {
            config,
            gate,
            policy_store,
            loader,
            evaluator: PolicyEvaluator::new(),
            trust,
            escalations,
            proof,
            ledger,
            deployment: self.deployment,
        }
    }
}

/// The assembled governance engine.
pub struct DecisionCoordinator {
    config: WardgateConfig,
    gate: SecurityGate,
    policy_store: Arc<dyn PolicyStore>,
    loader: PolicyLoader,
    evaluator: PolicyEvaluator,
    trust: TrustEngine,
    escalations: EscalationCoordinator,
    proof: Arc<ProofChain>,
    ledger: Arc<dyn ProofLedger>,
    deployment: DeploymentContext,
}

impl DecisionCoordinator {
    /// Builder with in-memory defaults.
    #[must_use]
    pub fn builder(config: WardgateConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Fully in-memory coordinator with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::builder(WardgateConfig::default()).build()
    }

    /// Govern one intent.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError`] for unauthorized or malformed requests,
    /// deadline overruns, and backend failures. Tier-requirement failures
    /// and policy denials are *decisions* — they come back as `Ok` replies
    /// with `action = deny`.
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionReply, DecisionError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(request.deadline_ms.max(1));
        let now = Utc::now();
        let request_id = Uuid::new_v4().to_string();

        self.proof
            .append(
                &request.tenant_id,
                &request.agent_id,
                ProofKind::IntentReceived,
                json!({
                    "intentId": request.intent.id,
                    "intentType": request.intent.intent_type,
                    "requestId": request_id,
                }),
            )
            .await?;

        // Trust first: the gate's requirements are indexed by the agent's
        // effective tier.
        let (competence, observability) = self
            .agent_inputs(&request.agent_id, &request.tenant_id)
            .await?;
        let attestations: Vec<_> = request.attestation.clone().into_iter().collect();
        let effective = self
            .bounded(deadline, "trust_lookup", async {
                self.trust
                    .effective_trust(
                        &request.agent_id,
                        competence,
                        observability,
                        &attestations,
                        self.deployment,
                        now,
                    )
                    .await
            })
            .await??;
        let trust_summary = TrustSummary::from(effective);

        let creds = SecurityCredentials {
            access_token: request.access_token.clone(),
            binding: request.request_binding.clone(),
            attestation: request.attestation.clone(),
            pairwise_id: request.pairwise_id.clone(),
            data_sensitivity: request.data_sensitivity,
            high_value: is_high_value(
                &request.intent.intent_type,
                request.intent.tagged_high_value(),
            ),
        };

        let pre = self.gate.pre_check(effective.tier, &creds);
        if !pre.allow {
            return self
                .deny_reply(
                    &request,
                    &request_id,
                    trust_summary,
                    pre.deny_reason
                        .unwrap_or_else(|| "mandatory security controls missing".into()),
                    started,
                )
                .await;
        }

        let gate_result = self
            .bounded(deadline, "security_check", async {
                self.gate.validate(effective.tier, &creds, now).await
            })
            .await?;
        if let Err(err) = gate_result {
            if crate::errors::BoundaryError::code(&err) == ErrorCode::Unauthorized {
                return Err(err.into());
            }
            let reason = err.to_string();
            return self
                .deny_reply(&request, &request_id, trust_summary, reason, started)
                .await;
        }

        let policies = self
            .bounded(deadline, "load_policies", async {
                self.loader.load(&request.tenant_id, None).await
            })
            .await??;

        let context = EvaluationContext {
            intent: IntentContext {
                id: request.intent.id.clone(),
                intent_type: request.intent.intent_type.clone(),
                description: request.intent.description.clone(),
                attributes: request.intent.context.clone(),
            },
            entity: EntityContext {
                id: request.agent_id.clone(),
                entity_type: "agent".into(),
                trust_score: effective.score,
                trust_band: effective.band,
                attributes: json!({}),
            },
            environment: EnvironmentContext {
                timestamp: now,
                timezone: None,
                request_id: request_id.clone(),
            },
            custom: None,
        };

        self.ensure_deadline(deadline, "evaluate")?;
        let outcome = self.evaluator.evaluate(&policies, &context, None);

        if outcome.final_action == ActionKind::Escalate {
            return self
                .escalate_reply(&request, &request_id, trust_summary, &policies, outcome, started)
                .await;
        }

        let event = self
            .proof
            .append(
                &request.tenant_id,
                &request.agent_id,
                ProofKind::DecisionMade,
                json!({
                    "intentId": request.intent.id,
                    "requestId": request_id,
                    "action": outcome.final_action,
                    "reason": outcome.reason,
                    "appliedPolicy": outcome.applied_policy,
                }),
            )
            .await?;

        Ok(DecisionReply {
            action: outcome.final_action,
            reason: outcome.reason,
            constraints: outcome.constraints,
            escalation_id: None,
            proof_hash: event.hash,
            effective_trust: trust_summary,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Re-enter the pipeline with an escalation resolution. Approved
    /// resolutions allow (with any constraints frozen at escalation time);
    /// rejections deny.
    pub async fn resolve_escalation(
        &self,
        escalation_id: &str,
        tenant_id: &str,
        resolution: Resolution,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<DecisionReply, DecisionError> {
        let started = Instant::now();
        let escalation = self
            .escalations
            .resolve(
                escalation_id,
                tenant_id,
                ResolveRequest {
                    resolution,
                    resolved_by: resolved_by.to_string(),
                    notes,
                },
            )
            .await?;

        let action = match resolution {
            Resolution::Approved => ActionKind::Allow,
            Resolution::Rejected => ActionKind::Deny,
        };
        let constraints = escalation
            .context
            .get("constraints")
            .and_then(serde_json::Value::as_object)
            .cloned();

        let (competence, observability) =
            self.agent_inputs(&escalation.entity_id, tenant_id).await?;
        let effective = self
            .trust
            .effective_trust(
                &escalation.entity_id,
                competence,
                observability,
                &[],
                self.deployment,
                Utc::now(),
            )
            .await?;

        let event = self
            .proof
            .append(
                tenant_id,
                &escalation.entity_id,
                ProofKind::DecisionMade,
                json!({
                    "intentId": escalation.intent_id,
                    "escalationId": escalation.id,
                    "action": action,
                    "resolvedBy": resolved_by,
                }),
            )
            .await?;

        Ok(DecisionReply {
            action,
            reason: escalation.resolution_notes.clone(),
            constraints,
            escalation_id: Some(escalation.id),
            proof_hash: event.hash,
            effective_trust: TrustSummary::from(effective),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Run the escalation timeout sweep; each timed-out escalation
    /// materialises its decision (`deny` under `autoDenyOnTimeout`, the
    /// fallback action otherwise) as a `decision_made` proof event. Returns
    /// the number of escalations timed out.
    pub async fn process_timeouts(&self) -> Result<usize, DecisionError> {
        let timed_out = self.escalations.process_timeouts().await?;
        for escalation in &timed_out {
            self.proof
                .append(
                    &escalation.tenant_id,
                    &escalation.entity_id,
                    ProofKind::DecisionMade,
                    json!({
                        "intentId": escalation.intent_id,
                        "escalationId": escalation.id,
                        "action": escalation.timeout_action(),
                        "timedOut": true,
                    }),
                )
                .await?;
        }
        Ok(timed_out.len())
    }

    /// Ingest a trust signal (administrative/runtime input path).
    pub async fn ingest_signal(
        &self,
        tenant_id: &str,
        input: SignalInput,
    ) -> Result<SignalOutcome, TrustError> {
        self.trust.ingest(tenant_id, input).await
    }

    /// Create a policy and invalidate the tenant's cache.
    pub async fn create_policy(
        &self,
        tenant_id: &str,
        input: CreatePolicyInput,
    ) -> Result<Policy, PolicyStoreError> {
        let namespace = input.namespace.clone();
        let policy = self.policy_store.create(tenant_id, input).await?;
        self.loader.invalidate(tenant_id, Some(&namespace)).await;
        Ok(policy)
    }

    /// Update a policy and invalidate the tenant's cache.
    pub async fn update_policy(
        &self,
        id: &str,
        tenant_id: &str,
        input: UpdatePolicyInput,
    ) -> Result<Policy, PolicyStoreError> {
        let policy = self.policy_store.update(id, tenant_id, input).await?;
        self.loader.invalidate(tenant_id, Some(&policy.namespace)).await;
        Ok(policy)
    }

    /// Publish a policy and invalidate the tenant's cache.
    pub async fn publish_policy(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Policy, PolicyStoreError> {
        let policy = self.policy_store.publish(id, tenant_id).await?;
        self.loader.invalidate(tenant_id, Some(&policy.namespace)).await;
        Ok(policy)
    }

    /// Archive (soft-delete) a policy and invalidate the tenant's cache.
    pub async fn archive_policy(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Policy, PolicyStoreError> {
        let policy = self.policy_store.archive(id, tenant_id).await?;
        self.loader.invalidate(tenant_id, Some(&policy.namespace)).await;
        Ok(policy)
    }

    /// Flush the proof queue and stop background delivery.
    pub async fn shutdown(&self) -> Result<(), ProofChainError> {
        self.proof.shutdown().await
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &WardgateConfig {
        &self.config
    }

    /// The policy store.
    #[must_use]
    pub fn policies(&self) -> &Arc<dyn PolicyStore> {
        &self.policy_store
    }

    /// The policy loader (cache administration).
    #[must_use]
    pub fn loader(&self) -> &PolicyLoader {
        &self.loader
    }

    /// The trust engine.
    #[must_use]
    pub fn trust(&self) -> &TrustEngine {
        &self.trust
    }

    /// The escalation coordinator.
    #[must_use]
    pub fn escalations(&self) -> &EscalationCoordinator {
        &self.escalations
    }

    /// The proof chain.
    #[must_use]
    pub fn proof(&self) -> &Arc<ProofChain> {
        &self.proof
    }

    /// The proof ledger (verification queries).
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn ProofLedger> {
        &self.ledger
    }

    async fn deny_reply(
        &self,
        request: &DecisionRequest,
        request_id: &str,
        trust: TrustSummary,
        reason: String,
        started: Instant,
    ) -> Result<DecisionReply, DecisionError> {
        let event = self
            .proof
            .append(
                &request.tenant_id,
                &request.agent_id,
                ProofKind::DecisionMade,
                json!({
                    "intentId": request.intent.id,
                    "requestId": request_id,
                    "action": ActionKind::Deny,
                    "reason": reason,
                }),
            )
            .await?;
        Ok(DecisionReply {
            action: ActionKind::Deny,
            reason: Some(reason),
            constraints: None,
            escalation_id: None,
            proof_hash: event.hash,
            effective_trust: trust,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn escalate_reply(
        &self,
        request: &DecisionRequest,
        request_id: &str,
        trust: TrustSummary,
        policies: &[Policy],
        outcome: EvaluationOutcome,
        started: Instant,
    ) -> Result<DecisionReply, DecisionError> {
        let directive = outcome.escalation.clone();
        let fallback_action = outcome
            .applied_policy
            .as_ref()
            .and_then(|id| policies.iter().find(|p| &p.id == id))
            .map_or(ActionKind::Allow, |p| p.definition.default_action);

        let escalation = self
            .escalations
            .create(
                CreateEscalationRequest {
                    tenant_id: request.tenant_id.clone(),
                    intent_id: request.intent.id.clone(),
                    entity_id: request.agent_id.clone(),
                    reason: outcome
                        .reason
                        .clone()
                        .unwrap_or_else(|| "policy escalation".into()),
                    priority: EscalationPriority::High,
                    escalated_to: directive
                        .as_ref()
                        .map_or_else(|| "governance".to_string(), |d| d.to.clone()),
                    escalated_by: None,
                    context: json!({
                        "requestId": request_id,
                        "constraints": outcome.constraints,
                        "appliedPolicy": outcome.applied_policy,
                    }),
                    requested_action: ActionKind::Escalate,
                    fallback_action,
                    auto_deny_on_timeout: directive
                        .as_ref()
                        .is_some_and(|d| d.auto_deny_on_timeout),
                    timeout_minutes: directive.as_ref().map(|d| d.timeout.minutes()),
                },
                ActorType::System,
            )
            .await?;

        let event = self
            .proof
            .append(
                &request.tenant_id,
                &request.agent_id,
                ProofKind::DecisionMade,
                json!({
                    "intentId": request.intent.id,
                    "requestId": request_id,
                    "action": ActionKind::Escalate,
                    "escalationId": escalation.id,
                    "escalatedTo": escalation.escalated_to,
                }),
            )
            .await?;

        Ok(DecisionReply {
            action: ActionKind::Escalate,
            reason: outcome.reason,
            constraints: outcome.constraints,
            escalation_id: Some(escalation.id),
            proof_hash: event.hash,
            effective_trust: trust,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn agent_inputs(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<(CompetenceLevel, ObservabilityClass), TrustError> {
        Ok(
            match self.trust.store().get_agent(agent_id, tenant_id).await? {
                Some(record) => (
                    record.identity.competence,
                    ObservabilityClass::infer(&record.metadata),
                ),
                None => (CompetenceLevel::None, ObservabilityClass::BlackBox),
            },
        )
    }

    fn ensure_deadline(
        &self,
        deadline: Instant,
        stage: &'static str,
    ) -> Result<(), DecisionError> {
        if Instant::now() >= deadline {
            return Err(DecisionError::DeadlineExceeded { stage });
        }
        Ok(())
    }

    async fn bounded<T>(
        &self,
        deadline: Instant,
        stage: &'static str,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, DecisionError> {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => return Err(DecisionError::DeadlineExceeded { stage }),
        };
        tokio::time::timeout(remaining, fut)
            .await
            .map_err(|_| DecisionError::DeadlineExceeded { stage })
    }
}
