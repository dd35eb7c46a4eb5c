//! Tier-indexed security requirements.
//!
//! Higher tiers unlock more authority, so they carry stricter controls:
//!
//! | tier  | binding proof | attestation | pairwise id | sync revocation | max token TTL |
//! |-------|---------------|-------------|-------------|-----------------|---------------|
//! | T0–T1 | optional      | –           | –           | –               | 60 min |
//! | T2    | required      | –           | –           | –               | 30 min |
//! | T3    | required      | –           | sensitive   | –               | 15 min |
//! | T4    | required      | required    | sensitive   | high-value ops  | 10 min |
//! | T5    | required      | + key proof | sensitive   | always          | 5 min |

use serde::{Deserialize, Serialize};

use crate::types::TrustBand;

/// Whether a request-bound proof (DPoP-style) must accompany the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingRequirement {
    Optional,
    Required,
}

/// Whether the agent must present a currently-valid attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationRequirement {
    NotRequired,
    Required,
    /// Attestation plus a key-binding proof (T5).
    RequiredWithKeyBinding,
}

/// Whether a pairwise identifier is needed for sensitive data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairwiseRequirement {
    NotRequired,
    /// Required when `data_sensitivity` is confidential or restricted.
    RequiredForSensitive,
}

/// When a synchronous revocation check (and introspection) must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationRequirement {
    NotRequired,
    HighValueOnly,
    Always,
}

/// The control set demanded of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRequirements {
    pub tier: TrustBand,
    pub binding_proof: BindingRequirement,
    pub attestation: AttestationRequirement,
    pub pairwise_id: PairwiseRequirement,
    pub revocation: RevocationRequirement,
    pub max_token_ttl_minutes: u64,
}

/// Default per-tier token TTLs in minutes, T0..T5.
pub const DEFAULT_TOKEN_TTL_MINUTES: [u64; 6] = [60, 60, 30, 15, 10, 5];

impl TierRequirements {
    /// Requirements for `tier` with the given per-tier TTL table.
    #[must_use]
    pub fn for_tier(tier: TrustBand, ttl_minutes: &[u64; 6]) -> Self {
        let max_token_ttl_minutes = ttl_minutes[tier.index()];
        match tier {
            TrustBand::T0 | TrustBand::T1 => Self {
                tier,
                binding_proof: BindingRequirement::Optional,
                attestation: AttestationRequirement::NotRequired,
                pairwise_id: PairwiseRequirement::NotRequired,
                revocation: RevocationRequirement::NotRequired,
                max_token_ttl_minutes,
            },
            TrustBand::T2 => Self {
                tier,
                binding_proof: BindingRequirement::Required,
                attestation: AttestationRequirement::NotRequired,
                pairwise_id: PairwiseRequirement::NotRequired,
                revocation: RevocationRequirement::NotRequired,
                max_token_ttl_minutes,
            },
            TrustBand::T3 => Self {
                tier,
                binding_proof: BindingRequirement::Required,
                attestation: AttestationRequirement::NotRequired,
                pairwise_id: PairwiseRequirement::RequiredForSensitive,
                revocation: RevocationRequirement::NotRequired,
                max_token_ttl_minutes,
            },
            TrustBand::T4 => Self {
                tier,
                binding_proof: BindingRequirement::Required,
                attestation: AttestationRequirement::Required,
                pairwise_id: PairwiseRequirement::RequiredForSensitive,
                revocation: RevocationRequirement::HighValueOnly,
                max_token_ttl_minutes,
            },
            TrustBand::T5 => Self {
                tier,
                binding_proof: BindingRequirement::Required,
                attestation: AttestationRequirement::RequiredWithKeyBinding,
                pairwise_id: PairwiseRequirement::RequiredForSensitive,
                revocation: RevocationRequirement::Always,
                max_token_ttl_minutes,
            },
        }
    }
}
