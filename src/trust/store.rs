//! Trust persistence seam: profiles, score history, signals, agents, and
//! attestations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::trust::signal::TrustSignal;
use crate::types::{
    AgentIdentity, CertificateStatus, DeploymentEnvironment, TrustBand, VerificationLevel,
};

/// Behavioral counters feeding the 0.40-weight component. Counters are `f64`
/// because signal weights scale the increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralStats {
    pub successes: f64,
    pub failures: f64,
    pub quality_sum: f64,
    pub quality_count: f64,
    pub efficiency_sum: f64,
    pub efficiency_count: f64,
}

/// Compliance counters feeding the 0.25-weight component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStats {
    pub adherent: f64,
    pub audits_passed: f64,
    pub violations: f64,
    /// Severity-weighted violation total (low ×1 .. critical ×10).
    pub weighted_violations: f64,
}

/// Identity facts feeding the 0.20-weight component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySignals {
    pub verification: VerificationLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateStatus>,
}

impl Default for IdentitySignals {
    fn default() -> Self {
        Self {
            verification: VerificationLevel::Unverified,
            certificate: None,
        }
    }
}

/// Deployment facts feeding the 0.15-weight component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSignals {
    pub environment: DeploymentEnvironment,
    pub isolated: bool,
    pub tls: bool,
    pub managed_secrets: bool,
}

impl Default for ContextSignals {
    fn default() -> Self {
        Self {
            environment: DeploymentEnvironment::Production,
            isolated: false,
            tls: false,
            managed_secrets: false,
        }
    }
}

/// The per-agent trust state the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustProfile {
    pub agent_id: String,
    pub behavioral: BehavioralStats,
    pub compliance: ComplianceStats,
    pub identity: IdentitySignals,
    pub context: ContextSignals,
    /// Start of the current decay window; reset by qualifying signals.
    pub last_activity: DateTime<Utc>,
    /// Composite score before decay and ceilings.
    pub raw_score: u16,
    /// Decayed score at the last recompute (no deployment ceilings applied).
    pub score: u16,
    pub band: TrustBand,
    pub updated_at: DateTime<Utc>,
}

impl TrustProfile {
    /// Fresh profile for an agent with no signals yet.
    #[must_use]
    pub fn bootstrap(agent_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            behavioral: BehavioralStats::default(),
            compliance: ComplianceStats::default(),
            identity: IdentitySignals::default(),
            context: ContextSignals::default(),
            last_activity: now,
            raw_score: 0,
            score: 0,
            band: TrustBand::T0,
            updated_at: now,
        }
    }
}

/// One score-change row in the audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustHistoryEntry {
    pub agent_id: String,
    pub at: DateTime<Utc>,
    pub score: u16,
    pub band: TrustBand,
    pub delta: i32,
    pub reason: String,
}

/// A registered agent: identity, governance metadata, lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub tenant_id: String,
    pub identity: AgentIdentity,
    /// Observability hints and operator facts
    /// (`observability`, `source_code_url`, `audit_date`, ...).
    #[serde(default)]
    pub metadata: Value,
    pub status: AgentStatus,
}

/// Lifecycle status of an agent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    Retired,
}

/// A signed assertion that an agent holds a certification tier within a
/// scope. Only attestations inside their validity window count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub id: String,
    pub issuer: String,
    pub agent_id: String,
    pub tier: TrustBand,
    #[serde(default)]
    pub scope: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Present when the attestation is bound to a holder key (required at
    /// T5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_binding: Option<String>,
}

impl Attestation {
    /// Whether the validity window covers `now`.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.issued_at <= now && now < self.expires_at
    }
}

/// Effective certification tier: the maximum tier across currently-valid
/// attestations, `None` when nothing attests the agent.
#[must_use]
pub fn effective_certification(attestations: &[Attestation], now: DateTime<Utc>) -> Option<TrustBand> {
    attestations
        .iter()
        .filter(|a| a.is_current(now))
        .map(|a| a.tier)
        .max()
}

/// Errors from trust storage.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TrustStoreError {
    #[error("backend error: {message}")]
    #[diagnostic(code(wardgate::trust::backend))]
    Backend { message: String },
}

/// Persistence seam for the trust engine.
#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn get_profile(&self, agent_id: &str) -> Result<Option<TrustProfile>, TrustStoreError>;
    async fn put_profile(&self, profile: TrustProfile) -> Result<(), TrustStoreError>;
    async fn append_history(&self, entry: TrustHistoryEntry) -> Result<(), TrustStoreError>;
    async fn history(&self, agent_id: &str) -> Result<Vec<TrustHistoryEntry>, TrustStoreError>;
    async fn record_signal(&self, signal: TrustSignal) -> Result<(), TrustStoreError>;
    async fn signals(&self, entity_id: &str) -> Result<Vec<TrustSignal>, TrustStoreError>;
    /// Returns true when `(source, key)` was already seen; marks it either
    /// way.
    async fn check_and_mark_seen(&self, source: &str, key: &str)
        -> Result<bool, TrustStoreError>;
    async fn register_agent(&self, record: AgentRecord) -> Result<(), TrustStoreError>;
    async fn get_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Option<AgentRecord>, TrustStoreError>;
    async fn add_attestation(&self, attestation: Attestation) -> Result<(), TrustStoreError>;
    async fn attestations(&self, agent_id: &str) -> Result<Vec<Attestation>, TrustStoreError>;
}

#[derive(Default)]
struct Inner {
    profiles: FxHashMap<String, TrustProfile>,
    history: FxHashMap<String, Vec<TrustHistoryEntry>>,
    signals: FxHashMap<String, Vec<TrustSignal>>,
    seen: FxHashSet<(String, String)>,
    agents: FxHashMap<String, AgentRecord>,
    attestations: FxHashMap<String, Vec<Attestation>>,
}

/// In-process trust store.
#[derive(Default)]
pub struct MemoryTrustStore {
    inner: RwLock<Inner>,
}

impl MemoryTrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn get_profile(&self, agent_id: &str) -> Result<Option<TrustProfile>, TrustStoreError> {
        Ok(self.inner.read().await.profiles.get(agent_id).cloned())
    }

    async fn put_profile(&self, profile: TrustProfile) -> Result<(), TrustStoreError> {
        self.inner
            .write()
            .await
            .profiles
            .insert(profile.agent_id.clone(), profile);
        Ok(())
    }

    async fn append_history(&self, entry: TrustHistoryEntry) -> Result<(), TrustStoreError> {
        self.inner
            .write()
            .await
            .history
            .entry(entry.agent_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn history(&self, agent_id: &str) -> Result<Vec<TrustHistoryEntry>, TrustStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .history
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_signal(&self, signal: TrustSignal) -> Result<(), TrustStoreError> {
        self.inner
            .write()
            .await
            .signals
            .entry(signal.entity_id.clone())
            .or_default()
            .push(signal);
        Ok(())
    }

    async fn signals(&self, entity_id: &str) -> Result<Vec<TrustSignal>, TrustStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .signals
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn check_and_mark_seen(
        &self,
        source: &str,
        key: &str,
    ) -> Result<bool, TrustStoreError> {
        let mut inner = self.inner.write().await;
        Ok(!inner.seen.insert((source.to_string(), key.to_string())))
    }

    async fn register_agent(&self, record: AgentRecord) -> Result<(), TrustStoreError> {
        self.inner
            .write()
            .await
            .agents
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Option<AgentRecord>, TrustStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .agents
            .get(agent_id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn add_attestation(&self, attestation: Attestation) -> Result<(), TrustStoreError> {
        self.inner
            .write()
            .await
            .attestations
            .entry(attestation.agent_id.clone())
            .or_default()
            .push(attestation);
        Ok(())
    }

    async fn attestations(&self, agent_id: &str) -> Result<Vec<Attestation>, TrustStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .attestations
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certification_is_max_of_valid_attestations() {
        let now = Utc::now();
        let att = |tier, from_h: i64, to_h: i64| Attestation {
            id: uuid::Uuid::new_v4().to_string(),
            issuer: "issuer".into(),
            agent_id: "ag".into(),
            tier,
            scope: vec![],
            issued_at: now + chrono::Duration::hours(from_h),
            expires_at: now + chrono::Duration::hours(to_h),
            signature: "sig".into(),
            evidence: vec![],
            key_binding: None,
        };
        let atts = vec![
            att(TrustBand::T3, -2, 2),
            att(TrustBand::T5, 1, 3), // not yet valid
            att(TrustBand::T2, -5, 5),
        ];
        assert_eq!(effective_certification(&atts, now), Some(TrustBand::T3));
        assert_eq!(effective_certification(&[], now), None);
    }

    #[tokio::test]
    async fn seen_keys_deduplicate() {
        let store = MemoryTrustStore::new();
        assert!(!store.check_and_mark_seen("src", "k1").await.unwrap());
        assert!(store.check_and_mark_seen("src", "k1").await.unwrap());
        assert!(!store.check_and_mark_seen("other", "k1").await.unwrap());
    }
}
