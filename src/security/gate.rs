//! The pre-request security gate.
//!
//! Two entry points:
//!
//! * [`SecurityGate::pre_check`] — synchronous presence check of the
//!   controls the agent's tier demands. Cheap, no I/O, runs before policy
//!   evaluation.
//! * [`SecurityGate::validate`] — the full check: token lifetime and
//!   revocation, binding proof, attestation signature and window, and
//!   synchronous introspection for high-value operations.
//!
//! External verifiers are injected. Transient verifier failures retry with
//! capped backoff; persistent failure **fails closed** — a control that
//! cannot be checked is a control that failed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::canonical::sha256_hex;
use crate::errors::{BoundaryError, ErrorCode};
use crate::security::requirements::{
    AttestationRequirement, BindingRequirement, PairwiseRequirement, RevocationRequirement,
    TierRequirements, DEFAULT_TOKEN_TTL_MINUTES,
};
use crate::trust::store::Attestation;
use crate::types::{DataSensitivity, TrustBand};

/// Intent types that are always high-value.
const HIGH_VALUE_INTENTS: &[&str] = &["write", "delete", "transfer"];

/// Whether an operation counts as high-value: write/delete/transfer or
/// anything explicitly tagged.
#[must_use]
pub fn is_high_value(intent_type: &str, tagged_high_value: bool) -> bool {
    tagged_high_value || HIGH_VALUE_INTENTS.contains(&intent_type)
}

/// Bearer token plus its lifetime and optional confirmation claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Key-confirmation claim the binding proof must commit to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
}

/// A request-bound proof over method + URI + the token's confirmation claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBinding {
    pub method: String,
    pub uri: String,
    pub proof: String,
}

impl RequestBinding {
    /// The proof value a holder of `confirmation` produces for
    /// `method` + `uri`.
    #[must_use]
    pub fn proof_for(method: &str, uri: &str, confirmation: &str) -> String {
        sha256_hex(&format!("{method} {uri} {confirmation}"))
    }

    /// Check this binding against the token's confirmation claim.
    #[must_use]
    pub fn verifies(&self, confirmation: Option<&str>) -> bool {
        match confirmation {
            Some(cnf) => self.proof == Self::proof_for(&self.method, &self.uri, cnf),
            None => false,
        }
    }
}

/// The credential bundle extracted from a decision request.
#[derive(Debug, Clone)]
pub struct SecurityCredentials {
    pub access_token: AccessToken,
    pub binding: Option<RequestBinding>,
    pub attestation: Option<Attestation>,
    pub pairwise_id: Option<String>,
    pub data_sensitivity: DataSensitivity,
    /// Result of [`is_high_value`] for this request's intent.
    pub high_value: bool,
}

/// Outcome of the cheap pre-request check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreCheckOutcome {
    pub allow: bool,
    pub requirements: TierRequirements,
    /// Controls the caller must supply before resubmitting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
}

/// Gate failures. All map to 401/403-class codes; none leak verifier detail.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum GateError {
    #[error("missing access token")]
    #[diagnostic(code(wardgate::security::missing_token))]
    MissingToken,

    #[error("access token expired")]
    #[diagnostic(code(wardgate::security::token_expired))]
    TokenExpired,

    #[error("access token lifetime exceeds the {max_minutes} minute maximum for tier {tier}")]
    #[diagnostic(code(wardgate::security::token_ttl))]
    TokenTtlExceeded { tier: TrustBand, max_minutes: u64 },

    #[error("access token has been revoked")]
    #[diagnostic(code(wardgate::security::token_revoked))]
    TokenRevoked,

    #[error("request binding proof required for tier {tier}")]
    #[diagnostic(code(wardgate::security::missing_binding))]
    MissingBindingProof { tier: TrustBand },

    #[error("request binding proof does not match method, URI, and confirmation claim")]
    #[diagnostic(code(wardgate::security::invalid_binding))]
    InvalidBindingProof,

    #[error("attestation required for tier {tier}")]
    #[diagnostic(code(wardgate::security::missing_attestation))]
    MissingAttestation { tier: TrustBand },

    #[error("attestation rejected: {reason}")]
    #[diagnostic(code(wardgate::security::invalid_attestation))]
    InvalidAttestation { reason: String },

    #[error("attestation key-binding proof required at T5")]
    #[diagnostic(code(wardgate::security::missing_key_binding))]
    MissingKeyBinding,

    #[error("pairwise identifier required for {sensitivity:?} data at tier {tier}")]
    #[diagnostic(code(wardgate::security::missing_pairwise_id))]
    MissingPairwiseId {
        tier: TrustBand,
        sensitivity: DataSensitivity,
    },

    #[error("access token introspection reports inactive")]
    #[diagnostic(code(wardgate::security::introspection_inactive))]
    IntrospectionInactive,

    /// A verifier stayed unavailable through retries; the gate fails closed.
    #[error("security verifier unavailable, failing closed")]
    #[diagnostic(code(wardgate::security::verifier_unavailable))]
    VerifierUnavailable,
}

impl BoundaryError for GateError {
    fn code(&self) -> ErrorCode {
        match self {
            GateError::MissingToken | GateError::TokenExpired => ErrorCode::Unauthorized,
            _ => ErrorCode::Forbidden,
        }
    }
}

/// Transient or terminal failure inside an injected verifier.
#[derive(Debug, thiserror::Error)]
#[error("verifier error: {message}")]
pub struct VerifierError {
    pub message: String,
}

/// Synchronous token introspection backend.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// Whether the token is currently active at the issuer.
    async fn introspect(&self, token: &str) -> Result<bool, VerifierError>;
}

/// Revocation registry backend.
#[async_trait]
pub trait RevocationChecker: Send + Sync {
    async fn is_revoked(&self, token: &str) -> Result<bool, VerifierError>;
}

/// Attestation signature verification backend.
#[async_trait]
pub trait AttestationVerifier: Send + Sync {
    async fn verify(&self, attestation: &Attestation) -> Result<bool, VerifierError>;
}

/// Introspector that accepts every token. Default for deployments without an
/// issuer-side introspection endpoint.
#[derive(Default)]
pub struct AllowAllIntrospector;

#[async_trait]
impl TokenIntrospector for AllowAllIntrospector {
    async fn introspect(&self, _token: &str) -> Result<bool, VerifierError> {
        Ok(true)
    }
}

/// In-memory revocation list.
#[derive(Default)]
pub struct MemoryRevocationList {
    revoked: RwLock<FxHashSet<String>>,
}

impl MemoryRevocationList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token: impl Into<String>) {
        self.revoked.write().insert(token.into());
    }
}

#[async_trait]
impl RevocationChecker for MemoryRevocationList {
    async fn is_revoked(&self, token: &str) -> Result<bool, VerifierError> {
        Ok(self.revoked.read().contains(token))
    }
}

/// Digest-based attestation verifier: accepts an attestation whose signature
/// matches [`DigestAttestationVerifier::expected_signature`]. Deployments
/// with a real issuer PKI inject their own verifier.
#[derive(Default)]
pub struct DigestAttestationVerifier;

impl DigestAttestationVerifier {
    /// The signature this verifier expects an issuer to have produced.
    #[must_use]
    pub fn expected_signature(attestation: &Attestation) -> String {
        sha256_hex(&format!(
            "{}|{}|{}|{}|{}",
            attestation.issuer,
            attestation.agent_id,
            attestation.tier,
            attestation.issued_at.to_rfc3339(),
            attestation.expires_at.to_rfc3339(),
        ))
    }
}

#[async_trait]
impl AttestationVerifier for DigestAttestationVerifier {
    async fn verify(&self, attestation: &Attestation) -> Result<bool, VerifierError> {
        Ok(attestation.signature == Self::expected_signature(attestation))
    }
}

const VERIFIER_RETRIES: u32 = 3;
const VERIFIER_BACKOFF: Duration = Duration::from_millis(50);

/// The gate itself. Cheap to share; all state lives in the injected
/// verifiers.
pub struct SecurityGate {
    introspector: Arc<dyn TokenIntrospector>,
    revocations: Arc<dyn RevocationChecker>,
    attestations: Arc<dyn AttestationVerifier>,
    token_ttl_minutes: [u64; 6],
}

impl SecurityGate {
    #[must_use]
    pub fn new(
        introspector: Arc<dyn TokenIntrospector>,
        revocations: Arc<dyn RevocationChecker>,
        attestations: Arc<dyn AttestationVerifier>,
        token_ttl_minutes: [u64; 6],
    ) -> Self {
        Self {
            introspector,
            revocations,
            attestations,
            token_ttl_minutes,
        }
    }

    /// Gate with permissive default verifiers and the standard TTL table.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(AllowAllIntrospector),
            Arc::new(MemoryRevocationList::new()),
            Arc::new(DigestAttestationVerifier),
            DEFAULT_TOKEN_TTL_MINUTES,
        )
    }

    /// The requirements table row for a tier.
    #[must_use]
    pub fn requirements(&self, tier: TrustBand) -> TierRequirements {
        TierRequirements::for_tier(tier, &self.token_ttl_minutes)
    }

    /// Presence check of the mandatory controls for the agent's tier. No
    /// I/O, no cryptography — just "is everything the tier demands on the
    /// table".
    #[must_use]
    pub fn pre_check(&self, tier: TrustBand, creds: &SecurityCredentials) -> PreCheckOutcome {
        let requirements = self.requirements(tier);
        let mut required_actions = Vec::new();

        if creds.access_token.token.is_empty() {
            required_actions.push("supply an access token".to_string());
        }
        if requirements.binding_proof == BindingRequirement::Required && creds.binding.is_none() {
            required_actions.push("supply a request binding proof".to_string());
        }
        if requirements.attestation != AttestationRequirement::NotRequired
            && creds.attestation.is_none()
        {
            required_actions.push("supply a current attestation".to_string());
        }
        if requirements.attestation == AttestationRequirement::RequiredWithKeyBinding
            && creds
                .attestation
                .as_ref()
                .is_some_and(|a| a.key_binding.is_none())
        {
            required_actions.push("supply an attestation key-binding proof".to_string());
        }
        if requirements.pairwise_id == PairwiseRequirement::RequiredForSensitive
            && creds.data_sensitivity.requires_pairwise_id()
            && creds.pairwise_id.is_none()
        {
            required_actions.push("supply a pairwise identifier".to_string());
        }

        let allow = required_actions.is_empty();
        PreCheckOutcome {
            allow,
            requirements,
            deny_reason: (!allow)
                .then(|| format!("missing mandatory controls for tier {tier}")),
            required_actions,
        }
    }

    /// Full validation for a request at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first [`GateError`] encountered, in check order: token,
    /// TTL, binding, attestation, pairwise id, revocation, introspection.
    pub async fn validate(
        &self,
        tier: TrustBand,
        creds: &SecurityCredentials,
        now: DateTime<Utc>,
    ) -> Result<(), GateError> {
        let requirements = self.requirements(tier);
        let token = &creds.access_token;

        if token.token.is_empty() {
            return Err(GateError::MissingToken);
        }
        if now >= token.expires_at {
            return Err(GateError::TokenExpired);
        }
        let lifetime_minutes = (token.expires_at - token.issued_at).num_minutes().max(0) as u64;
        if lifetime_minutes > requirements.max_token_ttl_minutes {
            return Err(GateError::TokenTtlExceeded {
                tier,
                max_minutes: requirements.max_token_ttl_minutes,
            });
        }

        match (&creds.binding, requirements.binding_proof) {
            (None, BindingRequirement::Required) => {
                return Err(GateError::MissingBindingProof { tier });
            }
            (Some(binding), _) => {
                if !binding.verifies(token.confirmation.as_deref()) {
                    return Err(GateError::InvalidBindingProof);
                }
            }
            (None, BindingRequirement::Optional) => {}
        }

        match (&creds.attestation, requirements.attestation) {
            (None, AttestationRequirement::NotRequired) => {}
            (None, _) => return Err(GateError::MissingAttestation { tier }),
            (Some(attestation), requirement) => {
                if !attestation.is_current(now) {
                    return Err(GateError::InvalidAttestation {
                        reason: "outside validity window".into(),
                    });
                }
                if requirement == AttestationRequirement::RequiredWithKeyBinding
                    && attestation.key_binding.is_none()
                {
                    return Err(GateError::MissingKeyBinding);
                }
                let valid = with_retry("attestation", || self.attestations.verify(attestation))
                    .await
                    .map_err(|_| GateError::VerifierUnavailable)?;
                if !valid {
                    return Err(GateError::InvalidAttestation {
                        reason: "signature verification failed".into(),
                    });
                }
            }
        }

        if requirements.pairwise_id == PairwiseRequirement::RequiredForSensitive
            && creds.data_sensitivity.requires_pairwise_id()
            && creds.pairwise_id.is_none()
        {
            return Err(GateError::MissingPairwiseId {
                tier,
                sensitivity: creds.data_sensitivity,
            });
        }

        let check_sync = match requirements.revocation {
            RevocationRequirement::NotRequired => false,
            RevocationRequirement::HighValueOnly => creds.high_value,
            RevocationRequirement::Always => true,
        };
        if check_sync {
            let revoked = with_retry("revocation", || self.revocations.is_revoked(&token.token))
                .await
                .map_err(|_| GateError::VerifierUnavailable)?;
            if revoked {
                return Err(GateError::TokenRevoked);
            }
            let active = with_retry("introspection", || self.introspector.introspect(&token.token))
                .await
                .map_err(|_| GateError::VerifierUnavailable)?;
            if !active {
                return Err(GateError::IntrospectionInactive);
            }
        }

        Ok(())
    }
}

/// Retry a verifier call with capped exponential backoff. Exhausted retries
/// surface the last error — callers treat that as fail-closed.
async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, VerifierError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VerifierError>>,
{
    let mut backoff = VERIFIER_BACKOFF;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < VERIFIER_RETRIES => {
                tracing::warn!(check = what, attempt, error = %err, "verifier retry");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(500));
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(check = what, error = %err, "verifier unavailable, failing closed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn token(ttl_minutes: i64, confirmation: Option<&str>) -> AccessToken {
        let now = Utc::now();
        AccessToken {
            token: "tok-1".into(),
            issued_at: now,
            expires_at: now + ChronoDuration::minutes(ttl_minutes),
            confirmation: confirmation.map(String::from),
        }
    }

    fn attestation(tier: TrustBand, key_binding: Option<&str>) -> Attestation {
        let now = Utc::now();
        let mut att = Attestation {
            id: "att-1".into(),
            issuer: "issuer".into(),
            agent_id: "ag_A".into(),
            tier,
            scope: vec!["payments".into()],
            issued_at: now - ChronoDuration::hours(1),
            expires_at: now + ChronoDuration::hours(1),
            signature: String::new(),
            evidence: vec![],
            key_binding: key_binding.map(String::from),
        };
        att.signature = DigestAttestationVerifier::expected_signature(&att);
        att
    }

    fn creds(tier_ttl: i64) -> SecurityCredentials {
        SecurityCredentials {
            access_token: token(tier_ttl, Some("cnf-1")),
            binding: Some(RequestBinding {
                method: "POST".into(),
                uri: "https://api.example.com/act".into(),
                proof: RequestBinding::proof_for("POST", "https://api.example.com/act", "cnf-1"),
            }),
            attestation: None,
            pairwise_id: None,
            data_sensitivity: DataSensitivity::Internal,
            high_value: false,
        }
    }

    #[tokio::test]
    async fn t0_accepts_bare_token() {
        let gate = SecurityGate::with_defaults();
        let creds = SecurityCredentials {
            binding: None,
            ..creds(30)
        };
        assert!(gate.pre_check(TrustBand::T0, &creds).allow);
        gate.validate(TrustBand::T0, &creds, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn t2_requires_binding_proof() {
        let gate = SecurityGate::with_defaults();
        let missing = SecurityCredentials {
            binding: None,
            ..creds(20)
        };
        let pre = gate.pre_check(TrustBand::T2, &missing);
        assert!(!pre.allow);
        assert!(matches!(
            gate.validate(TrustBand::T2, &missing, Utc::now()).await,
            Err(GateError::MissingBindingProof { .. })
        ));

        gate.validate(TrustBand::T2, &creds(20), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ttl_table_is_enforced() {
        let gate = SecurityGate::with_defaults();
        // 20-minute token is fine at T2 (30m cap) but not at T3 (15m cap).
        let creds = creds(20);
        gate.validate(TrustBand::T2, &creds, Utc::now()).await.unwrap();
        assert!(matches!(
            gate.validate(TrustBand::T3, &creds, Utc::now()).await,
            Err(GateError::TokenTtlExceeded { max_minutes: 15, .. })
        ));
    }

    #[tokio::test]
    async fn tampered_binding_proof_rejected() {
        let gate = SecurityGate::with_defaults();
        let mut creds = creds(10);
        creds.binding.as_mut().unwrap().uri = "https://api.example.com/other".into();
        assert!(matches!(
            gate.validate(TrustBand::T2, &creds, Utc::now()).await,
            Err(GateError::InvalidBindingProof)
        ));
    }

    #[tokio::test]
    async fn t4_requires_attestation() {
        let gate = SecurityGate::with_defaults();
        let mut c = creds(5);
        assert!(matches!(
            gate.validate(TrustBand::T4, &c, Utc::now()).await,
            Err(GateError::MissingAttestation { .. })
        ));
        c.attestation = Some(attestation(TrustBand::T4, None));
        gate.validate(TrustBand::T4, &c, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn t5_requires_key_binding() {
        let gate = SecurityGate::with_defaults();
        let mut c = creds(4);
        c.attestation = Some(attestation(TrustBand::T5, None));
        assert!(matches!(
            gate.validate(TrustBand::T5, &c, Utc::now()).await,
            Err(GateError::MissingKeyBinding)
        ));
        c.attestation = Some(attestation(TrustBand::T5, Some("kb-1")));
        gate.validate(TrustBand::T5, &c, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn sensitive_data_needs_pairwise_id_at_t3() {
        let gate = SecurityGate::with_defaults();
        let mut c = creds(10);
        c.data_sensitivity = DataSensitivity::Confidential;
        assert!(matches!(
            gate.validate(TrustBand::T3, &c, Utc::now()).await,
            Err(GateError::MissingPairwiseId { .. })
        ));
        c.pairwise_id = Some("pw-1".into());
        gate.validate(TrustBand::T3, &c, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn revoked_token_rejected_on_high_value_at_t4() {
        let revocations = Arc::new(MemoryRevocationList::new());
        revocations.revoke("tok-1");
        let gate = SecurityGate::new(
            Arc::new(AllowAllIntrospector),
            Arc::clone(&revocations) as Arc<dyn RevocationChecker>,
            Arc::new(DigestAttestationVerifier),
            DEFAULT_TOKEN_TTL_MINUTES,
        );
        let mut c = creds(5);
        c.attestation = Some(attestation(TrustBand::T4, None));
        c.high_value = true;
        assert!(matches!(
            gate.validate(TrustBand::T4, &c, Utc::now()).await,
            Err(GateError::TokenRevoked)
        ));

        // Low-value operations at T4 skip the synchronous check.
        c.high_value = false;
        gate.validate(TrustBand::T4, &c, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn unavailable_verifier_fails_closed() {
        struct Flaky;
        #[async_trait]
        impl RevocationChecker for Flaky {
            async fn is_revoked(&self, _token: &str) -> Result<bool, VerifierError> {
                Err(VerifierError {
                    message: "down".into(),
                })
            }
        }
        let gate = SecurityGate::new(
            Arc::new(AllowAllIntrospector),
            Arc::new(Flaky),
            Arc::new(DigestAttestationVerifier),
            DEFAULT_TOKEN_TTL_MINUTES,
        );
        let mut c = creds(4);
        c.attestation = Some(attestation(TrustBand::T5, Some("kb")));
        // Paused clock auto-advances through the retry backoff.
        tokio::time::pause();
        let err = gate.validate(TrustBand::T5, &c, Utc::now()).await.unwrap_err();
        assert!(matches!(err, GateError::VerifierUnavailable));
    }

    #[test]
    fn high_value_classification() {
        assert!(is_high_value("transfer", false));
        assert!(is_high_value("read", true));
        assert!(!is_high_value("read", false));
    }
}
