//! Escalation storage seam and in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use super::{Escalation, EscalationAuditEntry, EscalationStatus};

/// Errors from escalation storage.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EscalationStoreError {
    #[error("backend error: {message}")]
    #[diagnostic(code(wardgate::escalation::backend))]
    Backend { message: String },
}

/// Tenant-scoped query over escalations.
#[derive(Debug, Clone)]
pub struct EscalationQuery {
    pub tenant_id: String,
    pub status: Option<EscalationStatus>,
    pub intent_id: Option<String>,
    pub entity_id: Option<String>,
    pub escalated_to: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl EscalationQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            status: None,
            intent_id: None,
            entity_id: None,
            escalated_to: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Persistence seam for escalations and their audit trail.
#[async_trait]
pub trait EscalationStore: Send + Sync {
    async fn insert(&self, escalation: Escalation) -> Result<(), EscalationStoreError>;

    async fn get(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Option<Escalation>, EscalationStoreError>;

    /// Replace a stored escalation (same id).
    async fn update(&self, escalation: Escalation) -> Result<(), EscalationStoreError>;

    async fn query(&self, query: EscalationQuery) -> Result<Vec<Escalation>, EscalationStoreError>;

    /// Atomically transition every pending escalation whose `timeout_at` is
    /// at or before `now` to `timeout`, returning the rows that changed.
    /// Idempotent: a second sweep at the same instant returns nothing.
    async fn claim_timeouts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Escalation>, EscalationStoreError>;

    async fn append_audit(&self, entry: EscalationAuditEntry) -> Result<(), EscalationStoreError>;

    async fn audit_trail(
        &self,
        escalation_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<EscalationAuditEntry>, EscalationStoreError>;

    async fn pending_count(&self, tenant_id: &str) -> Result<usize, EscalationStoreError>;
}

#[derive(Default)]
struct Inner {
    escalations: FxHashMap<String, Escalation>,
    audit: FxHashMap<String, Vec<EscalationAuditEntry>>,
}

/// In-process escalation store.
#[derive(Default)]
pub struct MemoryEscalationStore {
    inner: RwLock<Inner>,
}

impl MemoryEscalationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscalationStore for MemoryEscalationStore {
    async fn insert(&self, escalation: Escalation) -> Result<(), EscalationStoreError> {
        self.inner
            .write()
            .await
            .escalations
            .insert(escalation.id.clone(), escalation);
        Ok(())
    }

    async fn get(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Option<Escalation>, EscalationStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .escalations
            .get(id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn update(&self, escalation: Escalation) -> Result<(), EscalationStoreError> {
        self.inner
            .write()
            .await
            .escalations
            .insert(escalation.id.clone(), escalation);
        Ok(())
    }

    async fn query(&self, query: EscalationQuery) -> Result<Vec<Escalation>, EscalationStoreError> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Escalation> = inner
            .escalations
            .values()
            .filter(|e| e.tenant_id == query.tenant_id)
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .filter(|e| query.intent_id.as_deref().is_none_or(|i| e.intent_id == i))
            .filter(|e| query.entity_id.as_deref().is_none_or(|i| e.entity_id == i))
            .filter(|e| {
                query
                    .escalated_to
                    .as_deref()
                    .is_none_or(|to| e.escalated_to == to)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn claim_timeouts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Escalation>, EscalationStoreError> {
        let mut inner = self.inner.write().await;
        let mut claimed = Vec::new();
        for escalation in inner.escalations.values_mut() {
            if escalation.status == EscalationStatus::Pending && escalation.timeout_at <= now {
                escalation.status = EscalationStatus::Timeout;
                escalation.updated_at = now;
                claimed.push(escalation.clone());
            }
        }
        claimed.sort_by(|a, b| (a.timeout_at, &a.id).cmp(&(b.timeout_at, &b.id)));
        Ok(claimed)
    }

    async fn append_audit(&self, entry: EscalationAuditEntry) -> Result<(), EscalationStoreError> {
        self.inner
            .write()
            .await
            .audit
            .entry(entry.escalation_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn audit_trail(
        &self,
        escalation_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<EscalationAuditEntry>, EscalationStoreError> {
        let inner = self.inner.read().await;
        let visible = inner
            .escalations
            .get(escalation_id)
            .is_some_and(|e| e.tenant_id == tenant_id);
        if !visible {
            return Ok(Vec::new());
        }
        Ok(inner.audit.get(escalation_id).cloned().unwrap_or_default())
    }

    async fn pending_count(&self, tenant_id: &str) -> Result<usize, EscalationStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .escalations
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.status == EscalationStatus::Pending)
            .count())
    }
}
