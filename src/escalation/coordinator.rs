//! The escalation coordinator: create, resolve, cancel, and the timeout
//! sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{BoundaryError, ErrorCode};
use crate::types::ActionKind;

use super::store::{EscalationQuery, EscalationStore, EscalationStoreError};
use super::{
    ActorType, Escalation, EscalationAuditEntry, EscalationPriority, EscalationStatus, Resolution,
};

/// Coordinator errors.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EscalationError {
    #[error("escalation not found: {id}")]
    #[diagnostic(code(wardgate::escalation::not_found))]
    NotFound { id: String },

    /// The escalation is already in a terminal state.
    #[error("escalation {id} is already {status:?}")]
    #[diagnostic(code(wardgate::escalation::already_resolved))]
    AlreadyResolved {
        id: String,
        status: EscalationStatus,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] EscalationStoreError),
}

impl BoundaryError for EscalationError {
    fn code(&self) -> ErrorCode {
        match self {
            EscalationError::NotFound { .. } => ErrorCode::NotFound,
            EscalationError::AlreadyResolved { .. } => ErrorCode::Conflict,
            EscalationError::Store(_) => ErrorCode::Internal,
        }
    }
}

/// Input to [`EscalationCoordinator::create`].
#[derive(Debug, Clone)]
pub struct CreateEscalationRequest {
    pub tenant_id: String,
    pub intent_id: String,
    pub entity_id: String,
    pub reason: String,
    pub priority: EscalationPriority,
    pub escalated_to: String,
    pub escalated_by: Option<String>,
    pub context: Value,
    pub requested_action: ActionKind,
    pub fallback_action: ActionKind,
    pub auto_deny_on_timeout: bool,
    /// `None` uses the coordinator's configured default.
    pub timeout_minutes: Option<u32>,
}

/// Input to [`EscalationCoordinator::resolve`].
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub resolution: Resolution,
    pub resolved_by: String,
    pub notes: Option<String>,
}

/// Drives the escalation state machine over an [`EscalationStore`].
pub struct EscalationCoordinator {
    store: Arc<dyn EscalationStore>,
    default_timeout_minutes: u32,
}

impl EscalationCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn EscalationStore>, default_timeout_minutes: u32) -> Self {
        Self {
            store,
            default_timeout_minutes,
        }
    }

    /// Create a pending escalation and audit it.
    pub async fn create(
        &self,
        request: CreateEscalationRequest,
        actor_type: ActorType,
    ) -> Result<Escalation, EscalationError> {
        self.create_at(request, actor_type, Utc::now()).await
    }

    /// Create with an explicit clock (used by the decision pipeline and in
    /// tests).
    pub async fn create_at(
        &self,
        request: CreateEscalationRequest,
        actor_type: ActorType,
        now: DateTime<Utc>,
    ) -> Result<Escalation, EscalationError> {
        let timeout_minutes = request
            .timeout_minutes
            .unwrap_or(self.default_timeout_minutes);
        let escalation = Escalation {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id,
            intent_id: request.intent_id,
            entity_id: request.entity_id,
            reason: request.reason,
            priority: request.priority,
            status: EscalationStatus::Pending,
            escalated_to: request.escalated_to,
            escalated_by: request.escalated_by.clone(),
            context: request.context,
            requested_action: request.requested_action,
            fallback_action: request.fallback_action,
            auto_deny_on_timeout: request.auto_deny_on_timeout,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
            resolution_notes: None,
            timeout_at: now + Duration::seconds(i64::from(timeout_minutes) * 60),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(escalation.clone()).await?;
        self.audit(
            &escalation.id,
            "created",
            request.escalated_by.as_deref().unwrap_or("system"),
            actor_type,
            None,
            None,
            now,
        )
        .await?;
        Ok(escalation)
    }

    /// Resolve a pending escalation.
    ///
    /// Idempotent: re-resolving with the same resolution returns the stored
    /// row unchanged; a different resolution on a terminal row is a
    /// conflict.
    pub async fn resolve(
        &self,
        id: &str,
        tenant_id: &str,
        request: ResolveRequest,
    ) -> Result<Escalation, EscalationError> {
        let now = Utc::now();
        let mut escalation = self.require(id, tenant_id).await?;

        if escalation.status.is_terminal() {
            if escalation.status == request.resolution.status() {
                return Ok(escalation);
            }
            return Err(EscalationError::AlreadyResolved {
                id: id.to_string(),
                status: escalation.status,
            });
        }

        let previous = escalation.status;
        escalation.status = request.resolution.status();
        escalation.resolution = Some(request.resolution);
        escalation.resolved_by = Some(request.resolved_by.clone());
        escalation.resolved_at = Some(now);
        escalation.resolution_notes = request.notes.clone();
        escalation.updated_at = now;
        self.store.update(escalation.clone()).await?;

        let action = match request.resolution {
            Resolution::Approved => "approved",
            Resolution::Rejected => "rejected",
        };
        self.audit(
            id,
            action,
            &request.resolved_by,
            ActorType::User,
            Some(previous),
            request.notes.as_deref(),
            now,
        )
        .await?;
        Ok(escalation)
    }

    /// Cancel a pending escalation.
    pub async fn cancel(
        &self,
        id: &str,
        tenant_id: &str,
        cancelled_by: &str,
        reason: Option<&str>,
    ) -> Result<Escalation, EscalationError> {
        let now = Utc::now();
        let mut escalation = self.require(id, tenant_id).await?;

        if escalation.status.is_terminal() {
            if escalation.status == EscalationStatus::Cancelled {
                return Ok(escalation);
            }
            return Err(EscalationError::AlreadyResolved {
                id: id.to_string(),
                status: escalation.status,
            });
        }

        let previous = escalation.status;
        escalation.status = EscalationStatus::Cancelled;
        escalation.resolved_by = Some(cancelled_by.to_string());
        escalation.resolved_at = Some(now);
        escalation.resolution_notes = reason.map(String::from);
        escalation.updated_at = now;
        self.store.update(escalation.clone()).await?;
        self.audit(
            id,
            "cancelled",
            cancelled_by,
            ActorType::User,
            Some(previous),
            reason,
            now,
        )
        .await?;
        Ok(escalation)
    }

    /// Sweep every pending escalation past its deadline into `timeout`,
    /// audit each, and return them. Idempotent.
    pub async fn process_timeouts(&self) -> Result<Vec<Escalation>, EscalationError> {
        self.process_timeouts_at(Utc::now()).await
    }

    /// Timeout sweep with an explicit clock.
    pub async fn process_timeouts_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Escalation>, EscalationError> {
        let claimed = self.store.claim_timeouts(now).await?;
        for escalation in &claimed {
            self.audit(
                &escalation.id,
                "timeout",
                "system",
                ActorType::System,
                Some(EscalationStatus::Pending),
                None,
                now,
            )
            .await?;
            tracing::info!(
                escalation_id = %escalation.id,
                entity_id = %escalation.entity_id,
                auto_deny = escalation.auto_deny_on_timeout,
                "escalation timed out",
            );
        }
        Ok(claimed)
    }

    /// Tenant-scoped fetch.
    pub async fn get(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Option<Escalation>, EscalationError> {
        Ok(self.store.get(id, tenant_id).await?)
    }

    /// Tenant-scoped listing.
    pub async fn query(&self, query: EscalationQuery) -> Result<Vec<Escalation>, EscalationError> {
        Ok(self.store.query(query).await?)
    }

    /// Audit history of one escalation.
    pub async fn audit_trail(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Vec<EscalationAuditEntry>, EscalationError> {
        Ok(self.store.audit_trail(id, tenant_id).await?)
    }

    /// Count of pending escalations for a tenant.
    pub async fn pending_count(&self, tenant_id: &str) -> Result<usize, EscalationError> {
        Ok(self.store.pending_count(tenant_id).await?)
    }

    async fn require(&self, id: &str, tenant_id: &str) -> Result<Escalation, EscalationError> {
        self.store
            .get(id, tenant_id)
            .await?
            .ok_or_else(|| EscalationError::NotFound { id: id.to_string() })
    }

    #[allow(clippy::too_many_arguments)]
    async fn audit(
        &self,
        escalation_id: &str,
        action: &str,
        actor: &str,
        actor_type: ActorType,
        previous_status: Option<EscalationStatus>,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        self.store
            .append_audit(EscalationAuditEntry {
                id: Uuid::new_v4().to_string(),
                escalation_id: escalation_id.to_string(),
                action: action.to_string(),
                actor: actor.to_string(),
                actor_type,
                previous_status,
                notes: notes.map(String::from),
                at,
            })
            .await?;
        Ok(())
    }
}
