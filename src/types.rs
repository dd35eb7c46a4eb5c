//! Core vocabulary shared by every subsystem: trust bands, decision actions,
//! competence and observability classes, and the sensitivity scale.
//!
//! All enums here are plain data — ordering is derived where the domain is
//! ordered (bands, actions by restrictiveness, sensitivity) so comparisons
//! like `band >= TrustBand::T4` work naturally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum trust score on the canonical scale.
pub const MAX_SCORE: u16 = 1000;

/// Trust band `T0`..`T5`, derived from a score via fixed band boundaries.
///
/// Two mappings coexist:
///
/// * [`TrustBand::from_score`] — the canonical band boundaries
///   (T0 0–166, T1 167–332, T2 333–499, T3 500–665, T4 666–832, T5 833–1000).
/// * [`TrustBand::from_runtime_score`] — the runtime-tier minima
///   (0, 200, 400, 600, 800, 900), used only for tier-ceiling math.
///
/// Both are total and monotone in the score.
///
/// Serialization uses the canonical `"T0"`..`"T5"` labels; deserialization
/// additionally accepts the two legacy suffixed conventions
/// (`T4_TRUSTED` / `T4_AUTONOMOUS`, ...) as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrustBand {
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
}

impl TrustBand {
    /// All bands in ascending order.
    pub const ALL: [TrustBand; 6] = [
        TrustBand::T0,
        TrustBand::T1,
        TrustBand::T2,
        TrustBand::T3,
        TrustBand::T4,
        TrustBand::T5,
    ];

    /// Lowest score that maps to this band under the canonical boundaries.
    #[must_use]
    pub const fn min_score(self) -> u16 {
        match self {
            TrustBand::T0 => 0,
            TrustBand::T1 => 167,
            TrustBand::T2 => 333,
            TrustBand::T3 => 500,
            TrustBand::T4 => 666,
            TrustBand::T5 => 833,
        }
    }

    /// Highest score that maps to this band under the canonical boundaries.
    #[must_use]
    pub const fn max_score(self) -> u16 {
        match self {
            TrustBand::T0 => 166,
            TrustBand::T1 => 332,
            TrustBand::T2 => 499,
            TrustBand::T3 => 665,
            TrustBand::T4 => 832,
            TrustBand::T5 => MAX_SCORE,
        }
    }

    /// Runtime-tier minimum score for this band (the secondary view).
    #[must_use]
    pub const fn runtime_floor(self) -> u16 {
        match self {
            TrustBand::T0 => 0,
            TrustBand::T1 => 200,
            TrustBand::T2 => 400,
            TrustBand::T3 => 600,
            TrustBand::T4 => 800,
            TrustBand::T5 => 900,
        }
    }

    /// Canonical band for a score (clamped to [0, 1000]).
    #[must_use]
    pub fn from_score(score: u16) -> Self {
        match score.min(MAX_SCORE) {
            0..=166 => TrustBand::T0,
            167..=332 => TrustBand::T1,
            333..=499 => TrustBand::T2,
            500..=665 => TrustBand::T3,
            666..=832 => TrustBand::T4,
            _ => TrustBand::T5,
        }
    }

    /// Runtime tier for a score: the highest band whose runtime minimum the
    /// score meets.
    #[must_use]
    pub fn from_runtime_score(score: u16) -> Self {
        let score = score.min(MAX_SCORE);
        let mut tier = TrustBand::T0;
        for band in Self::ALL {
            if score >= band.runtime_floor() {
                tier = band;
            }
        }
        tier
    }

    /// Zero-based index (T0 = 0 .. T5 = 5).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            TrustBand::T0 => 0,
            TrustBand::T1 => 1,
            TrustBand::T2 => 2,
            TrustBand::T3 => 3,
            TrustBand::T4 => 4,
            TrustBand::T5 => 5,
        }
    }

    fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }
}

impl fmt::Display for TrustBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.index())
    }
}

impl Serialize for TrustBand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TrustBand {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The two legacy alias conventions, indexed by tier (T1..T5). Any other
/// suffix is rejected.
const ALIASES_CERTIFIED: [&str; 5] = ["OBSERVED", "LIMITED", "STANDARD", "TRUSTED", "CERTIFIED"];
const ALIASES_MISSION: [&str; 5] = [
    "SUPERVISED",
    "CONSTRAINED",
    "TRUSTED",
    "AUTONOMOUS",
    "MISSION_CRITICAL",
];

/// Error parsing a trust band name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized trust band: {input}")]
pub struct ParseBandError {
    pub input: String,
}

impl FromStr for TrustBand {
    type Err = ParseBandError;

    /// Accepts `T0`..`T5` plus both legacy suffixed conventions
    /// (`T4_TRUSTED`, `T4_AUTONOMOUS`, ...). A suffix outside the two known
    /// conventions is an error, not a fallback.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let err = || ParseBandError {
            input: s.to_string(),
        };
        let rest = upper.strip_prefix('T').ok_or_else(err)?;
        let (digit, suffix) = match rest.split_once('_') {
            Some((d, suffix)) => (d, Some(suffix)),
            None => (rest, None),
        };
        let idx: u8 = digit.parse().map_err(|_| err())?;
        let band = TrustBand::from_index(idx).ok_or_else(err)?;
        if let Some(suffix) = suffix {
            let tier = idx.checked_sub(1).ok_or_else(err)? as usize;
            let known = ALIASES_CERTIFIED.get(tier) == Some(&suffix)
                || ALIASES_MISSION.get(tier) == Some(&suffix);
            if !known {
                return Err(err());
            }
        }
        Ok(band)
    }
}

/// A governance decision, ordered by restrictiveness: `Deny` is the most
/// restrictive, `Allow` the least. Combining actions always keeps the
/// minimum, so `a.min(b)` is "the more restrictive of the two".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Deny,
    Terminate,
    Escalate,
    Limit,
    Monitor,
    Allow,
}

impl ActionKind {
    /// All actions, most restrictive first.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Deny,
        ActionKind::Terminate,
        ActionKind::Escalate,
        ActionKind::Limit,
        ActionKind::Monitor,
        ActionKind::Allow,
    ];

    /// The more restrictive of two actions.
    #[must_use]
    pub fn combine(self, other: ActionKind) -> ActionKind {
        self.min(other)
    }

    /// Whether `self` is strictly more restrictive than `other`.
    #[must_use]
    pub fn is_more_restrictive_than(self, other: ActionKind) -> bool {
        self < other
    }

    /// Wire label (`"deny"`, `"allow"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Deny => "deny",
            ActionKind::Terminate => "terminate",
            ActionKind::Escalate => "escalate",
            ActionKind::Limit => "limit",
            ActionKind::Monitor => "monitor",
            ActionKind::Allow => "allow",
        }
    }

    /// Parse a wire label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deny" => Some(ActionKind::Deny),
            "terminate" => Some(ActionKind::Terminate),
            "escalate" => Some(ActionKind::Escalate),
            "limit" => Some(ActionKind::Limit),
            "monitor" => Some(ActionKind::Monitor),
            "allow" => Some(ActionKind::Allow),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Competence level carried by an agent identity. Caps the effective tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CompetenceLevel {
    #[default]
    None,
    Basic,
    Intermediate,
    Advanced,
    Expert,
    Master,
}

impl CompetenceLevel {
    /// The highest tier an agent of this competence may hold.
    #[must_use]
    pub const fn tier_ceiling(self) -> TrustBand {
        match self {
            CompetenceLevel::None => TrustBand::T0,
            CompetenceLevel::Basic => TrustBand::T1,
            CompetenceLevel::Intermediate => TrustBand::T2,
            CompetenceLevel::Advanced => TrustBand::T3,
            CompetenceLevel::Expert => TrustBand::T4,
            CompetenceLevel::Master => TrustBand::T5,
        }
    }
}

/// How inspectable an agent's internals are. Caps the effective score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservabilityClass {
    BlackBox,
    GrayBox,
    WhiteBox,
    Attested,
    Verified,
}

impl ObservabilityClass {
    /// Maximum score an agent of this class may reach.
    #[must_use]
    pub const fn score_cap(self) -> u16 {
        match self {
            ObservabilityClass::BlackBox => 600,
            ObservabilityClass::GrayBox => 750,
            ObservabilityClass::WhiteBox => 900,
            ObservabilityClass::Attested => 950,
            ObservabilityClass::Verified => MAX_SCORE,
        }
    }

    /// Derive the class from agent metadata.
    ///
    /// An explicit `observability` field wins; otherwise inference runs in
    /// priority order: verification proof, attested provider, source-code
    /// URL, audit date, and finally `BlackBox`.
    #[must_use]
    pub fn infer(metadata: &serde_json::Value) -> Self {
        if let Some(explicit) = metadata
            .get("observability")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_string())).ok())
        {
            return explicit;
        }
        let present = |key: &str| {
            metadata
                .get(key)
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""))
        };
        if present("verification_proof") {
            ObservabilityClass::Verified
        } else if present("attested_provider") {
            ObservabilityClass::Attested
        } else if present("source_code_url") {
            ObservabilityClass::WhiteBox
        } else if present("audit_date") {
            ObservabilityClass::GrayBox
        } else {
            ObservabilityClass::BlackBox
        }
    }
}

/// Sensitivity of the data an intent touches. Ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DataSensitivity {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataSensitivity {
    /// Sensitive enough to require a pairwise identifier at T3+.
    #[must_use]
    pub fn requires_pairwise_id(self) -> bool {
        self >= DataSensitivity::Confidential
    }
}

/// Severity of a compliance violation, with its score deduction multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ViolationSeverity {
    /// Deduction weight relative to a low-severity violation.
    #[must_use]
    pub const fn multiplier(self) -> u32 {
        match self {
            ViolationSeverity::Low => 1,
            ViolationSeverity::Medium => 2,
            ViolationSeverity::High => 5,
            ViolationSeverity::Critical => 10,
        }
    }
}

/// Deployment environment the agent runs in. More exposed environments
/// contribute less to the context component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnvironment {
    Sandbox,
    Development,
    Staging,
    Production,
    Public,
}

impl DeploymentEnvironment {
    /// Base weight of the context trust component.
    #[must_use]
    pub const fn context_weight(self) -> f64 {
        match self {
            DeploymentEnvironment::Sandbox => 1.0,
            DeploymentEnvironment::Development => 0.8,
            DeploymentEnvironment::Staging => 0.6,
            DeploymentEnvironment::Production => 0.4,
            DeploymentEnvironment::Public => 0.2,
        }
    }
}

/// Identity verification level of the operator behind an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    Unverified,
    Email,
    Domain,
    Organization,
    Enterprise,
}

impl VerificationLevel {
    /// Base weight of the identity trust component.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            VerificationLevel::Unverified => 0.2,
            VerificationLevel::Email => 0.4,
            VerificationLevel::Domain => 0.6,
            VerificationLevel::Organization => 0.8,
            VerificationLevel::Enterprise => 1.0,
        }
    }
}

/// Certificate registration status; adds a bonus on top of the verification
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Registered,
    Verified,
    Certified,
    CertifiedPlus,
}

impl CertificateStatus {
    /// Identity-component bonus for this status.
    #[must_use]
    pub const fn bonus(self) -> f64 {
        match self {
            CertificateStatus::Registered => 0.0,
            CertificateStatus::Verified => 0.1,
            CertificateStatus::Certified => 0.2,
            CertificateStatus::CertifiedPlus => 0.3,
        }
    }
}

/// Immutable agent identity: `registry.organization.agent_class`, competence,
/// and operational domains. Carries **no trust** — trust is computed at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub registry: String,
    pub organization: String,
    pub agent_class: String,
    #[serde(default)]
    pub competence: CompetenceLevel,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl AgentIdentity {
    /// Dotted canonical form, e.g. `acme-registry.payments.reconciler`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}.{}.{}", self.registry, self.organization, self.agent_class)
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(TrustBand::from_score(0), TrustBand::T0);
        assert_eq!(TrustBand::from_score(166), TrustBand::T0);
        assert_eq!(TrustBand::from_score(167), TrustBand::T1);
        assert_eq!(TrustBand::from_score(332), TrustBand::T1);
        assert_eq!(TrustBand::from_score(333), TrustBand::T2);
        assert_eq!(TrustBand::from_score(499), TrustBand::T2);
        assert_eq!(TrustBand::from_score(500), TrustBand::T3);
        assert_eq!(TrustBand::from_score(665), TrustBand::T3);
        assert_eq!(TrustBand::from_score(666), TrustBand::T4);
        assert_eq!(TrustBand::from_score(832), TrustBand::T4);
        assert_eq!(TrustBand::from_score(833), TrustBand::T5);
        assert_eq!(TrustBand::from_score(1000), TrustBand::T5);
    }

    #[test]
    fn runtime_tier_minima() {
        assert_eq!(TrustBand::from_runtime_score(199), TrustBand::T0);
        assert_eq!(TrustBand::from_runtime_score(200), TrustBand::T1);
        assert_eq!(TrustBand::from_runtime_score(599), TrustBand::T2);
        assert_eq!(TrustBand::from_runtime_score(600), TrustBand::T3);
        assert_eq!(TrustBand::from_runtime_score(899), TrustBand::T4);
        assert_eq!(TrustBand::from_runtime_score(900), TrustBand::T5);
    }

    #[test]
    fn band_aliases_parse() {
        assert_eq!("T2".parse::<TrustBand>().unwrap(), TrustBand::T2);
        assert_eq!("T4_TRUSTED".parse::<TrustBand>().unwrap(), TrustBand::T4);
        assert_eq!("T3_TRUSTED".parse::<TrustBand>().unwrap(), TrustBand::T3);
        assert_eq!(
            "T5_MISSION_CRITICAL".parse::<TrustBand>().unwrap(),
            TrustBand::T5
        );
        assert_eq!("t1_observed".parse::<TrustBand>().unwrap(), TrustBand::T1);
    }

    #[test]
    fn third_convention_rejected() {
        assert!("T4_ELEVATED".parse::<TrustBand>().is_err());
        assert!("T9".parse::<TrustBand>().is_err());
        assert!("T0_OBSERVED".parse::<TrustBand>().is_err());
    }

    #[test]
    fn band_serde_accepts_aliases() {
        let band: TrustBand = serde_json::from_str(r#""T4_AUTONOMOUS""#).unwrap();
        assert_eq!(band, TrustBand::T4);
        assert_eq!(serde_json::to_string(&TrustBand::T4).unwrap(), r#""T4""#);
        assert!(serde_json::from_str::<TrustBand>(r#""T4_ELEVATED""#).is_err());
    }

    #[test]
    fn action_restrictiveness() {
        assert!(ActionKind::Deny < ActionKind::Terminate);
        assert!(ActionKind::Escalate < ActionKind::Allow);
        assert_eq!(
            ActionKind::Allow.combine(ActionKind::Escalate),
            ActionKind::Escalate
        );
        assert_eq!(
            ActionKind::Deny.combine(ActionKind::Monitor),
            ActionKind::Deny
        );
    }

    #[test]
    fn observability_inference_priority() {
        let meta = serde_json::json!({
            "source_code_url": "https://example.com/repo",
            "audit_date": "2025-11-01",
        });
        assert_eq!(ObservabilityClass::infer(&meta), ObservabilityClass::WhiteBox);

        let meta = serde_json::json!({"verification_proof": "zk:abc"});
        assert_eq!(ObservabilityClass::infer(&meta), ObservabilityClass::Verified);

        let meta = serde_json::json!({"observability": "gray_box", "verification_proof": "x"});
        assert_eq!(ObservabilityClass::infer(&meta), ObservabilityClass::GrayBox);

        assert_eq!(
            ObservabilityClass::infer(&serde_json::json!({})),
            ObservabilityClass::BlackBox
        );
    }
}
