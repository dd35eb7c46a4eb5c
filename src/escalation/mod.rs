//! Escalations: decisions suspended pending a named authority.
//!
//! An escalation is born `pending` and ends in exactly one terminal state
//! (`approved`, `rejected`, `cancelled`, `timeout`). Terminal states are
//! immutable; every transition writes an audit entry.

pub mod coordinator;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ActionKind;

pub use coordinator::{
    CreateEscalationRequest, EscalationCoordinator, EscalationError, ResolveRequest,
};
pub use store::{EscalationQuery, EscalationStore, EscalationStoreError, MemoryEscalationStore};

/// Lifecycle states. Only `pending` is mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
    Cancelled,
}

impl EscalationStatus {
    /// Whether this status accepts no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != EscalationStatus::Pending
    }
}

/// Urgency of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// How a pending escalation was resolved by its authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Rejected,
}

impl Resolution {
    /// The terminal status this resolution produces.
    #[must_use]
    pub fn status(self) -> EscalationStatus {
        match self {
            Resolution::Approved => EscalationStatus::Approved,
            Resolution::Rejected => EscalationStatus::Rejected,
        }
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
}

/// A suspended decision awaiting resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub id: String,
    pub tenant_id: String,
    pub intent_id: String,
    pub entity_id: String,
    pub reason: String,
    pub priority: EscalationPriority,
    pub status: EscalationStatus,
    pub escalated_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_by: Option<String>,
    /// Decision context frozen at escalation time (evaluation snapshot,
    /// rule constraints).
    #[serde(default)]
    pub context: Value,
    pub requested_action: ActionKind,
    /// Action the decision falls back to when the escalation times out
    /// without `auto_deny_on_timeout`.
    pub fallback_action: ActionKind,
    pub auto_deny_on_timeout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    pub timeout_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escalation {
    /// The decision this escalation materialises after timing out.
    #[must_use]
    pub fn timeout_action(&self) -> ActionKind {
        if self.auto_deny_on_timeout {
            ActionKind::Deny
        } else {
            self.fallback_action
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationAuditEntry {
    pub id: String,
    pub escalation_id: String,
    /// What happened: `created`, `approved`, `rejected`, `cancelled`,
    /// `timeout`.
    pub action: String,
    pub actor: String,
    pub actor_type: ActorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<EscalationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}
