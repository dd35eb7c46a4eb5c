//! The decision request/reply contract — the only wire surface the core
//! defines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::security::{AccessToken, RequestBinding};
use crate::trust::store::Attestation;
use crate::trust::EffectiveTrust;
use crate::types::{ActionKind, DataSensitivity, TrustBand};

/// A proposed action submitted for governance, not yet executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: String,
    pub intent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form intent attributes; conditions resolve paths into this.
    #[serde(default)]
    pub context: Value,
}

impl Intent {
    /// Whether the intent is tagged high-value in its context.
    #[must_use]
    pub fn tagged_high_value(&self) -> bool {
        self.context
            .get("highValue")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// One governance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub tenant_id: String,
    pub agent_id: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_binding: Option<RequestBinding>,
    pub access_token: AccessToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise_id: Option<String>,
    #[serde(default)]
    pub data_sensitivity: DataSensitivity,
    /// Request deadline; the pipeline aborts with `TIMEOUT` past it.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_deadline_ms() -> u64 {
    30_000
}

/// The `{score, band}` view of effective trust returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSummary {
    pub score: u16,
    pub band: TrustBand,
}

impl From<EffectiveTrust> for TrustSummary {
    fn from(trust: EffectiveTrust) -> Self {
        Self {
            score: trust.score,
            band: trust.band,
        }
    }
}

/// The decision returned for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReply {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Map<String, Value>>,
    /// Present when `action` is `escalate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
    /// Hash of the `decision_made` proof event sealed for this reply.
    pub proof_hash: String,
    pub effective_trust: TrustSummary,
    pub duration_ms: u64,
}
