//! The trust engine: component scoring, time decay, ceiling/floor
//! composition, and the signal update protocol.
//!
//! # Score composition
//!
//! Four weighted components, each in `[0, 1]`:
//!
//! | component  | weight | inputs |
//! |------------|--------|--------|
//! | behavioral | 0.40   | success/failure (failures ×3), quality, efficiency |
//! | compliance | 0.25   | adherence, audit passes, severity-weighted violations |
//! | identity   | 0.20   | verification level + certificate bonus |
//! | context    | 0.15   | deployment environment + isolation/TLS/secret bonuses |
//!
//! The composite rescales to `[0, 1000]`, decays with idle time, and is then
//! clamped by the certification floor/ceiling, the observability ceiling,
//! and the deployment-context ceiling — in that order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BoundaryError, ErrorCode};
use crate::proof::{ProofChain, ProofChainError, ProofKind};
use crate::trust::signal::{SignalInput, SignalKind, SignalRateLimiter, TrustSignal};
use crate::trust::store::{
    effective_certification, Attestation, BehavioralStats, ComplianceStats, TrustHistoryEntry,
    TrustProfile, TrustStore, TrustStoreError,
};
use crate::types::{
    CertificateStatus, CompetenceLevel, DeploymentEnvironment, ObservabilityClass, TrustBand,
    VerificationLevel, ViolationSeverity, MAX_SCORE,
};

/// Component weights.
const W_BEHAVIORAL: f64 = 0.40;
const W_COMPLIANCE: f64 = 0.25;
const W_IDENTITY: f64 = 0.20;
const W_CONTEXT: f64 = 0.15;

/// Behavioral samples required before the component fully dominates; below
/// this the raw value is shrunk toward neutral.
const MIN_BEHAVIORAL_SAMPLES: f64 = 10.0;

/// Per-violation deduction on the compliance rate, scaled by severity
/// multiplier.
const VIOLATION_DEDUCTION: f64 = 0.01;

/// Decay milestones `(day, retention)` at the reference half-life of 182
/// days. Days 0–6 are a full-retention grace window.
const DECAY_MILESTONES: [(f64, f64); 6] = [
    (7.0, 0.95),
    (14.0, 0.88),
    (28.0, 0.75),
    (56.0, 0.62),
    (112.0, 0.55),
    (182.0, 0.50),
];

const REFERENCE_HALF_LIFE_DAYS: f64 = 182.0;

/// Time-decay schedule. A non-default half-life scales every milestone
/// proportionally.
#[derive(Debug, Clone, Copy)]
pub struct DecaySchedule {
    scale: f64,
}

impl Default for DecaySchedule {
    fn default() -> Self {
        Self::new(REFERENCE_HALF_LIFE_DAYS)
    }
}

impl DecaySchedule {
    #[must_use]
    pub fn new(half_life_days: f64) -> Self {
        Self {
            scale: (half_life_days / REFERENCE_HALF_LIFE_DAYS).max(f64::MIN_POSITIVE),
        }
    }

    /// Retention factor after `days` of inactivity. Non-increasing in
    /// `days`; linear between milestones; floored at the final milestone's
    /// retention.
    #[must_use]
    pub fn retention(&self, days: f64) -> f64 {
        let days = days.max(0.0) / self.scale;
        let (first_day, first_ret) = DECAY_MILESTONES[0];
        if days < first_day {
            return 1.0;
        }
        let mut prev = (first_day, first_ret);
        for (day, ret) in DECAY_MILESTONES {
            if days < day {
                let (prev_day, prev_ret) = prev;
                let progress = (days - prev_day) / (day - prev_day);
                return prev_ret - progress * (prev_ret - ret);
            }
            prev = (day, ret);
        }
        prev.1
    }

    /// Decayed score for `raw` after `days` idle.
    #[must_use]
    pub fn apply(&self, raw: u16, days: f64) -> u16 {
        ((f64::from(raw) * self.retention(days)).round() as u16).min(MAX_SCORE)
    }
}

/// Deployment-scoped inputs to effective trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentContext {
    /// Externally supplied per-deployment maximum tier.
    pub max_tier: TrustBand,
}

impl Default for DeploymentContext {
    fn default() -> Self {
        Self {
            max_tier: TrustBand::T5,
        }
    }
}

/// Effective trust for one agent in one deployment at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveTrust {
    /// Clamped effective score in `[0, 1000]`.
    pub score: u16,
    /// Band of the effective score (canonical boundaries).
    pub band: TrustBand,
    /// Effective tier: the minimum of every tier ceiling. Drives the
    /// security gate.
    pub tier: TrustBand,
}

/// Outcome of one signal ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalOutcome {
    /// False when the signal was dropped (unknown kind or duplicate).
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    pub previous_score: u16,
    pub previous_band: TrustBand,
    pub score: u16,
    pub band: TrustBand,
    pub band_changed: bool,
}

/// Errors from the trust engine.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TrustError {
    /// Source exceeded its hourly signal budget.
    #[error("signal source `{signal_source}` exceeded its hourly rate limit")]
    #[diagnostic(code(wardgate::trust::rate_limited))]
    RateLimited { signal_source: String },

    /// Source identifier missing or empty.
    #[error("signal source must be non-empty")]
    #[diagnostic(code(wardgate::trust::invalid_source))]
    InvalidSource,

    #[error(transparent)]
    #[diagnostic(code(wardgate::trust::store))]
    Store(#[from] TrustStoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Proof(#[from] ProofChainError),
}

impl BoundaryError for TrustError {
    fn code(&self) -> ErrorCode {
        match self {
            TrustError::RateLimited { .. } => ErrorCode::RateLimited,
            TrustError::InvalidSource => ErrorCode::ValidationError,
            TrustError::Store(_) | TrustError::Proof(_) => ErrorCode::Internal,
        }
    }
}

/// The trust engine. Signals go in, effective trust comes out.
pub struct TrustEngine {
    store: Arc<dyn TrustStore>,
    limiter: SignalRateLimiter,
    decay: DecaySchedule,
    proof: Option<Arc<ProofChain>>,
}

impl TrustEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn TrustStore>,
        limiter: SignalRateLimiter,
        decay: DecaySchedule,
        proof: Option<Arc<ProofChain>>,
    ) -> Self {
        Self {
            store,
            limiter,
            decay,
            proof,
        }
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    /// Ingest one signal at the current instant.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        input: SignalInput,
    ) -> Result<SignalOutcome, TrustError> {
        self.ingest_at(tenant_id, input, Utc::now()).await
    }

    /// Ingest one signal with an explicit receipt time.
    ///
    /// The full update protocol: validate the source, resolve the kind
    /// (unknown kinds drop with a warning), rate-limit, deduplicate,
    /// persist the signal, fold it into the profile, recompute and decay the
    /// composite, persist profile + history, and emit a `trust_delta` proof
    /// event (its payload flags a band change).
    pub async fn ingest_at(
        &self,
        tenant_id: &str,
        input: SignalInput,
        now: DateTime<Utc>,
    ) -> Result<SignalOutcome, TrustError> {
        if input.source.trim().is_empty() {
            return Err(TrustError::InvalidSource);
        }

        let profile_before = self
            .store
            .get_profile(&input.entity_id)
            .await?
            .unwrap_or_else(|| TrustProfile::bootstrap(&input.entity_id, now));
        let previous_score = profile_before.score;
        let previous_band = profile_before.band;

        let dropped = |reason: &str| SignalOutcome {
            accepted: false,
            drop_reason: Some(reason.to_string()),
            signal_id: None,
            previous_score,
            previous_band,
            score: previous_score,
            band: previous_band,
            band_changed: false,
        };

        let Some(kind) = SignalKind::parse(&input.signal_type) else {
            tracing::warn!(
                signal_type = %input.signal_type,
                entity_id = %input.entity_id,
                "unknown signal type dropped",
            );
            return Ok(dropped("unknown signal type"));
        };

        if !self.limiter.admit(&input.source, now) {
            return Err(TrustError::RateLimited {
                signal_source: input.source,
            });
        }

        if let Some(key) = &input.idempotency_key {
            if self.store.check_and_mark_seen(&input.source, key).await? {
                return Ok(dropped("duplicate"));
            }
        }

        let signal = TrustSignal {
            id: Uuid::new_v4().to_string(),
            entity_id: input.entity_id.clone(),
            kind,
            value: input.value,
            weight: input.weight.unwrap_or(1.0),
            source: input.source.clone(),
            timestamp: now,
            metadata: input.metadata.clone().unwrap_or(serde_json::Value::Null),
        };
        self.store.record_signal(signal.clone()).await?;

        let mut profile = profile_before;
        apply_signal(&mut profile, &signal);
        if kind.resets_decay() {
            profile.last_activity = now;
        }
        profile.raw_score = composite_score(&profile);
        let idle_days = (now - profile.last_activity).num_seconds() as f64 / 86_400.0;
        profile.score = self.decay.apply(profile.raw_score, idle_days);
        profile.band = TrustBand::from_score(profile.score);
        profile.updated_at = now;

        let band_changed = profile.band != previous_band;
        let delta = i32::from(profile.score) - i32::from(previous_score);

        persist_with_backoff(|| self.store.put_profile(profile.clone())).await?;
        persist_with_backoff(|| {
            self.store.append_history(TrustHistoryEntry {
                agent_id: profile.agent_id.clone(),
                at: now,
                score: profile.score,
                band: profile.band,
                delta,
                reason: format!("signal:{}", input.signal_type),
            })
        })
        .await?;

        if let Some(proof) = &self.proof {
            let mut payload = serde_json::json!({
                "signalId": signal.id,
                "signalType": input.signal_type,
                "source": input.source,
                "delta": delta,
                "score": profile.score,
                "band": profile.band.to_string(),
            });
            if band_changed {
                payload["tierChanged"] = serde_json::json!({
                    "from": previous_band.to_string(),
                    "to": profile.band.to_string(),
                });
            }
            proof
                .append_at(tenant_id, &profile.agent_id, ProofKind::TrustDelta, payload, now)
                .await?;
        }

        Ok(SignalOutcome {
            accepted: true,
            drop_reason: None,
            signal_id: Some(signal.id),
            previous_score,
            previous_band,
            score: profile.score,
            band: profile.band,
            band_changed,
        })
    }

    /// Effective trust for an agent in a deployment at `now`.
    ///
    /// Agents with no profile yet evaluate from a bootstrap profile — a
    /// fresh agent is T0, not an error.
    pub async fn effective_trust(
        &self,
        agent_id: &str,
        competence: CompetenceLevel,
        observability: ObservabilityClass,
        extra_attestations: &[Attestation],
        deployment: DeploymentContext,
        now: DateTime<Utc>,
    ) -> Result<EffectiveTrust, TrustError> {
        let profile = self
            .store
            .get_profile(agent_id)
            .await?
            .unwrap_or_else(|| TrustProfile::bootstrap(agent_id, now));

        let mut attestations = self.store.attestations(agent_id).await?;
        attestations.extend_from_slice(extra_attestations);
        let certification = effective_certification(&attestations, now);

        Ok(compose_effective(
            &profile,
            certification,
            competence,
            observability,
            deployment,
            &self.decay,
            now,
        ))
    }
}

const PERSIST_RETRIES: u32 = 3;
const PERSIST_BACKOFF: std::time::Duration = std::time::Duration::from_millis(50);

/// Retry a transient store write with capped exponential backoff.
async fn persist_with_backoff<F, Fut>(mut op: F) -> Result<(), TrustStoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), TrustStoreError>>,
{
    let mut backoff = PERSIST_BACKOFF;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < PERSIST_RETRIES => {
                tracing::warn!(attempt, error = %err, "trust persistence retry");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(std::time::Duration::from_millis(500));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Pure composition of effective trust from its inputs.
#[must_use]
pub fn compose_effective(
    profile: &TrustProfile,
    certification: Option<TrustBand>,
    competence: CompetenceLevel,
    observability: ObservabilityClass,
    deployment: DeploymentContext,
    decay: &DecaySchedule,
    now: DateTime<Utc>,
) -> EffectiveTrust {
    let idle_days = (now - profile.last_activity).num_seconds() as f64 / 86_400.0;
    let decayed = decay.apply(profile.raw_score, idle_days);

    // Certification floors then ceilings; unattested agents are bounded only
    // by observability and deployment.
    let cert_floor = certification.map_or(0, TrustBand::min_score);
    let cert_ceiling = certification.map_or(MAX_SCORE, TrustBand::max_score);

    let floored = decayed.max(cert_floor);
    let score = floored
        .min(cert_ceiling)
        .min(observability.score_cap())
        .min(deployment.max_tier.max_score());

    let tier = [
        certification.unwrap_or(TrustBand::T0),
        competence.tier_ceiling(),
        TrustBand::from_runtime_score(score),
        TrustBand::from_score(observability.score_cap()),
        deployment.max_tier,
    ]
    .into_iter()
    .min()
    .expect("non-empty ceiling list");

    EffectiveTrust {
        score,
        band: TrustBand::from_score(score),
        tier,
    }
}

/// Fold one signal into the profile counters.
fn apply_signal(profile: &mut TrustProfile, signal: &TrustSignal) {
    let weight = signal.weight.max(0.0);
    let count = (signal.value.unsigned_abs() as f64).max(1.0) * weight;
    match signal.kind {
        SignalKind::ExecutionSuccess => profile.behavioral.successes += count,
        SignalKind::ExecutionFailure => profile.behavioral.failures += count,
        SignalKind::Quality => {
            profile.behavioral.quality_sum +=
                (signal.value.clamp(0, 100) as f64 / 100.0) * weight;
            profile.behavioral.quality_count += weight;
        }
        SignalKind::Efficiency => {
            profile.behavioral.efficiency_sum +=
                (signal.value.clamp(0, 100) as f64 / 100.0) * weight;
            profile.behavioral.efficiency_count += weight;
        }
        SignalKind::PolicyAdherence => profile.compliance.adherent += count,
        SignalKind::AuditPass => profile.compliance.audits_passed += count,
        SignalKind::PolicyViolation => {
            let severity = signal
                .metadata
                .get("severity")
                .and_then(|v| serde_json::from_value::<ViolationSeverity>(v.clone()).ok())
                .unwrap_or(ViolationSeverity::Low);
            profile.compliance.violations += count;
            profile.compliance.weighted_violations += count * f64::from(severity.multiplier());
        }
        SignalKind::Verification => {
            if let Some(level) = signal
                .metadata
                .get("level")
                .and_then(|v| serde_json::from_value::<VerificationLevel>(v.clone()).ok())
            {
                profile.identity.verification = level;
            }
        }
        SignalKind::Certification => {
            profile.identity.certificate = signal
                .metadata
                .get("status")
                .and_then(|v| serde_json::from_value::<CertificateStatus>(v.clone()).ok());
        }
        SignalKind::Deployment => {
            if let Some(environment) = signal
                .metadata
                .get("environment")
                .and_then(|v| serde_json::from_value::<DeploymentEnvironment>(v.clone()).ok())
            {
                profile.context.environment = environment;
            }
            let flag = |key: &str| signal.metadata.get(key).and_then(serde_json::Value::as_bool);
            if let Some(isolated) = flag("isolated") {
                profile.context.isolated = isolated;
            }
            if let Some(tls) = flag("tls") {
                profile.context.tls = tls;
            }
            if let Some(managed) = flag("managedSecrets") {
                profile.context.managed_secrets = managed;
            }
        }
    }
}

fn behavioral_component(stats: &BehavioralStats) -> f64 {
    let mut parts = Vec::with_capacity(3);
    let outcomes = stats.successes + stats.failures;
    if outcomes > 0.0 {
        // Failures weigh three times as much as successes.
        parts.push(stats.successes / (stats.successes + 3.0 * stats.failures));
    }
    if stats.quality_count > 0.0 {
        parts.push((stats.quality_sum / stats.quality_count).clamp(0.0, 1.0));
    }
    if stats.efficiency_count > 0.0 {
        parts.push((stats.efficiency_sum / stats.efficiency_count).clamp(0.0, 1.0));
    }
    if parts.is_empty() {
        return 0.5;
    }
    let raw = parts.iter().sum::<f64>() / parts.len() as f64;

    let samples = outcomes + stats.quality_count + stats.efficiency_count;
    if samples < MIN_BEHAVIORAL_SAMPLES {
        // Below the minimum sample the component shrinks toward neutral.
        0.5 + (raw - 0.5) * (samples / MIN_BEHAVIORAL_SAMPLES)
    } else {
        raw
    }
}

fn compliance_component(stats: &ComplianceStats) -> f64 {
    let events = stats.adherent + stats.audits_passed + stats.violations;
    if events == 0.0 {
        return 0.5;
    }
    let base = (stats.adherent + stats.audits_passed) / events;
    (base - VIOLATION_DEDUCTION * stats.weighted_violations).clamp(0.0, 1.0)
}

/// Composite score over the four weighted components, rescaled to 0..=1000.
#[must_use]
pub fn composite_score(profile: &TrustProfile) -> u16 {
    let identity = (profile.identity.verification.weight()
        + profile.identity.certificate.map_or(0.0, CertificateStatus::bonus))
    .clamp(0.0, 1.0);
    let context = (profile.context.environment.context_weight()
        + if profile.context.isolated { 0.10 } else { 0.0 }
        + if profile.context.tls { 0.05 } else { 0.0 }
        + if profile.context.managed_secrets { 0.05 } else { 0.0 })
    .clamp(0.0, 1.0);

    let composite = W_BEHAVIORAL * behavioral_component(&profile.behavioral)
        + W_COMPLIANCE * compliance_component(&profile.compliance)
        + W_IDENTITY * identity
        + W_CONTEXT * context;

    ((composite * f64::from(MAX_SCORE)).round() as u16).min(MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::store::MemoryTrustStore;

    fn engine() -> TrustEngine {
        TrustEngine::new(
            Arc::new(MemoryTrustStore::new()),
            SignalRateLimiter::new(1000),
            DecaySchedule::default(),
            None,
        )
    }

    fn success(entity: &str, n: u32) -> SignalInput {
        SignalInput {
            entity_id: entity.into(),
            signal_type: "execution_success".into(),
            value: i64::from(n),
            weight: Some(1.0),
            source: "runtime".into(),
            metadata: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn decay_milestones_match_table() {
        let d = DecaySchedule::default();
        assert_eq!(d.retention(0.0), 1.0);
        assert_eq!(d.retention(6.9), 1.0);
        assert!((d.retention(7.0) - 0.95).abs() < 1e-9);
        assert!((d.retention(14.0) - 0.88).abs() < 1e-9);
        assert!((d.retention(28.0) - 0.75).abs() < 1e-9);
        assert!((d.retention(56.0) - 0.62).abs() < 1e-9);
        assert!((d.retention(112.0) - 0.55).abs() < 1e-9);
        assert!((d.retention(182.0) - 0.50).abs() < 1e-9);
        assert!((d.retention(400.0) - 0.50).abs() < 1e-9);
    }

    #[test]
    fn decay_interpolates_between_milestones() {
        let d = DecaySchedule::default();
        // Halfway between day 7 (0.95) and day 14 (0.88).
        let mid = d.retention(10.5);
        assert!((mid - 0.915).abs() < 1e-9);
        // Monotone non-increasing across the whole range.
        let mut prev = 1.0;
        for day in 0..400 {
            let r = d.retention(f64::from(day));
            assert!(r <= prev + 1e-12, "retention increased at day {day}");
            prev = r;
        }
    }

    #[test]
    fn unattested_fresh_profile_is_t0() {
        let now = Utc::now();
        let profile = TrustProfile::bootstrap("ag", now);
        let effective = compose_effective(
            &profile,
            None,
            CompetenceLevel::Master,
            ObservabilityClass::Verified,
            DeploymentContext::default(),
            &DecaySchedule::default(),
            now,
        );
        assert_eq!(effective.band, TrustBand::T0);
        assert_eq!(effective.tier, TrustBand::T0);
    }

    #[test]
    fn certification_floor_raises_score() {
        let now = Utc::now();
        let profile = TrustProfile::bootstrap("ag", now);
        let effective = compose_effective(
            &profile,
            Some(TrustBand::T3),
            CompetenceLevel::Expert,
            ObservabilityClass::WhiteBox,
            DeploymentContext::default(),
            &DecaySchedule::default(),
            now,
        );
        assert!(effective.score >= TrustBand::T3.min_score());
        assert_eq!(effective.band, TrustBand::T3);
    }

    #[test]
    fn observability_caps_score() {
        let now = Utc::now();
        let mut profile = TrustProfile::bootstrap("ag", now);
        profile.raw_score = 900;
        let effective = compose_effective(
            &profile,
            None,
            CompetenceLevel::Master,
            ObservabilityClass::BlackBox,
            DeploymentContext::default(),
            &DecaySchedule::default(),
            now,
        );
        assert_eq!(effective.score, 600);
    }

    #[test]
    fn deployment_ceiling_caps_score_and_tier() {
        let now = Utc::now();
        let mut profile = TrustProfile::bootstrap("ag", now);
        profile.raw_score = 900;
        let effective = compose_effective(
            &profile,
            Some(TrustBand::T5),
            CompetenceLevel::Master,
            ObservabilityClass::Verified,
            DeploymentContext {
                max_tier: TrustBand::T2,
            },
            &DecaySchedule::default(),
            now,
        );
        assert!(effective.score <= TrustBand::T2.max_score());
        assert!(effective.tier <= TrustBand::T2);
    }

    #[test]
    fn effective_score_always_bounded() {
        let now = Utc::now();
        let mut profile = TrustProfile::bootstrap("ag", now);
        profile.behavioral.successes = 1e6;
        profile.raw_score = composite_score(&profile);
        let effective = compose_effective(
            &profile,
            Some(TrustBand::T5),
            CompetenceLevel::Master,
            ObservabilityClass::Verified,
            DeploymentContext::default(),
            &DecaySchedule::default(),
            now,
        );
        assert!(effective.score <= MAX_SCORE);
        assert_eq!(effective.band, TrustBand::from_score(effective.score));
    }

    #[tokio::test]
    async fn ingest_accepts_and_scores() {
        let engine = engine();
        let outcome = engine.ingest("t1", success("ag", 1)).await.unwrap();
        assert!(outcome.accepted);
        assert!(outcome.score > 0);
    }

    #[tokio::test]
    async fn unknown_signal_dropped_not_fatal() {
        let engine = engine();
        let outcome = engine
            .ingest(
                "t1",
                SignalInput {
                    signal_type: "vibes".into(),
                    ..success("ag", 1)
                },
            )
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.drop_reason.as_deref(), Some("unknown signal type"));
    }

    #[tokio::test]
    async fn rate_limit_rejects_with_429_code() {
        let engine = TrustEngine::new(
            Arc::new(MemoryTrustStore::new()),
            SignalRateLimiter::new(1),
            DecaySchedule::default(),
            None,
        );
        engine.ingest("t1", success("ag", 1)).await.unwrap();
        let err = engine.ingest("t1", success("ag", 1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_dropped() {
        let engine = engine();
        let mut input = success("ag", 1);
        input.idempotency_key = Some("once".into());
        assert!(engine.ingest("t1", input.clone()).await.unwrap().accepted);
        let replay = engine.ingest("t1", input).await.unwrap();
        assert!(!replay.accepted);
        assert_eq!(replay.drop_reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn failures_outweigh_successes() {
        let engine = engine();
        for _ in 0..20 {
            engine.ingest("good", success("good", 1)).await.unwrap();
        }
        for _ in 0..10 {
            engine.ingest("bad", success("bad", 1)).await.unwrap();
        }
        for _ in 0..10 {
            engine
                .ingest(
                    "bad",
                    SignalInput {
                        signal_type: "execution_failure".into(),
                        ..success("bad", 1)
                    },
                )
                .await
                .unwrap();
        }
        let good = engine.store().get_profile("good").await.unwrap().unwrap();
        let bad = engine.store().get_profile("bad").await.unwrap().unwrap();
        assert!(good.score > bad.score);
    }
}
