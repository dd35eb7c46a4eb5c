//! Versioned, tenant-scoped policy storage.
//!
//! The [`PolicyStore`] trait is the persistence seam; [`MemoryPolicyStore`]
//! is the in-process reference implementation. Every mutation is atomic with
//! respect to the version history: updating a policy archives the previous
//! `(definition, version, checksum)` triple before the row changes.
//!
//! Cross-tenant reads return `None`/empty — existence of another tenant's
//! policy is never observable, not even as a 404 diagnostic.

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{BoundaryError, ErrorCode, ValidationIssue};
use crate::policy::definition::{
    compute_checksum, validate_definition, Policy, PolicyDefinition, PolicyStatus, PolicyVersion,
};

/// Errors from policy store operations.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PolicyStoreError {
    /// The submitted definition failed validation.
    #[error("policy definition failed validation with {} issue(s)", .issues.len())]
    #[diagnostic(code(wardgate::policy::validation))]
    Validation { issues: Vec<ValidationIssue> },

    /// The policy does not exist within the caller's tenant.
    #[error("policy not found: {id}")]
    #[diagnostic(code(wardgate::policy::not_found))]
    NotFound { id: String },

    /// A different policy already occupies `(tenant, namespace, name)`.
    #[error("policy `{name}` already exists in namespace `{namespace}`")]
    #[diagnostic(code(wardgate::policy::conflict))]
    NameTaken { namespace: String, name: String },

    /// Backend storage failure.
    #[error("backend error: {message}")]
    #[diagnostic(code(wardgate::policy::backend))]
    Backend { message: String },
}

impl BoundaryError for PolicyStoreError {
    fn code(&self) -> ErrorCode {
        match self {
            PolicyStoreError::Validation { .. } => ErrorCode::ValidationError,
            PolicyStoreError::NotFound { .. } => ErrorCode::NotFound,
            PolicyStoreError::NameTaken { .. } => ErrorCode::Conflict,
            PolicyStoreError::Backend { .. } => ErrorCode::Internal,
        }
    }
}

/// Input to [`PolicyStore::create`].
#[derive(Debug, Clone)]
pub struct CreatePolicyInput {
    pub name: String,
    pub namespace: String,
    pub description: Option<String>,
    /// Raw definition document; validated before storage.
    pub definition: serde_json::Value,
    pub created_by: String,
}

/// Input to [`PolicyStore::update`]. All fields optional; omitted fields are
/// left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdatePolicyInput {
    pub definition: Option<serde_json::Value>,
    pub description: Option<String>,
    pub status: Option<PolicyStatus>,
    pub change_summary: Option<String>,
    pub updated_by: Option<String>,
}

/// Listing filters. `tenant_id` is mandatory — listings never cross tenants.
#[derive(Debug, Clone)]
pub struct PolicyFilter {
    pub tenant_id: String,
    pub namespace: Option<String>,
    pub status: Option<PolicyStatus>,
    pub name: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl PolicyFilter {
    /// Default page size for listings.
    pub const DEFAULT_LIMIT: usize = 50;

    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            namespace: None,
            status: None,
            name: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Persistence seam for policies and their version history.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Validate and store a new policy at `version = 1`, status `draft`.
    ///
    /// Creation is idempotent on content: re-submitting the same definition
    /// under the same `(tenant, namespace, name)` returns the existing row.
    async fn create(
        &self,
        tenant_id: &str,
        input: CreatePolicyInput,
    ) -> Result<Policy, PolicyStoreError>;

    async fn find_by_id(&self, id: &str, tenant_id: &str)
        -> Result<Option<Policy>, PolicyStoreError>;

    async fn find_by_name(
        &self,
        tenant_id: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Policy>, PolicyStoreError>;

    /// Archive the current version into history and apply the changes,
    /// bumping `version`. Setting `status = published` stamps `published_at`.
    async fn update(
        &self,
        id: &str,
        tenant_id: &str,
        input: UpdatePolicyInput,
    ) -> Result<Policy, PolicyStoreError>;

    /// Status-only transition to `published` (bumps version).
    async fn publish(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError>;

    /// Status-only transition to `deprecated` (bumps version).
    async fn deprecate(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError>;

    /// Soft delete: status-only transition to `archived` (bumps version).
    async fn archive(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError>;

    /// Tenant-scoped listing with optional filters and pagination.
    async fn list(&self, filter: PolicyFilter) -> Result<Vec<Policy>, PolicyStoreError>;

    /// All `published` policies for a tenant, optionally narrowed to one
    /// namespace. Sorted by `(namespace, name)` for deterministic evaluation.
    async fn published_policies(
        &self,
        tenant_id: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Policy>, PolicyStoreError>;

    /// Archived versions of a policy, oldest first.
    async fn version_history(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Vec<PolicyVersion>, PolicyStoreError>;
}

#[derive(Default)]
struct Inner {
    policies: FxHashMap<String, Policy>,
    versions: FxHashMap<String, Vec<PolicyVersion>>,
    /// `(tenant, namespace, name)` → current policy id.
    by_name: FxHashMap<(String, String, String), String>,
}

/// In-process policy store backed by a `tokio::sync::RwLock`.
#[derive(Default)]
pub struct MemoryPolicyStore {
    inner: RwLock<Inner>,
}

impl MemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_validated(
        definition: &serde_json::Value,
    ) -> Result<(PolicyDefinition, String), PolicyStoreError> {
        let issues = validate_definition(definition);
        if !issues.is_empty() {
            return Err(PolicyStoreError::Validation { issues });
        }
        let parsed = PolicyDefinition::from_value(definition).map_err(|err| {
            PolicyStoreError::Backend {
                message: format!("validated definition failed to load: {err}"),
            }
        })?;
        Ok((parsed, compute_checksum(definition)))
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn create(
        &self,
        tenant_id: &str,
        input: CreatePolicyInput,
    ) -> Result<Policy, PolicyStoreError> {
        let (definition, checksum) = Self::parse_validated(&input.definition)?;
        let mut inner = self.inner.write().await;

        let name_key = (
            tenant_id.to_string(),
            input.namespace.clone(),
            input.name.clone(),
        );
        if let Some(existing_id) = inner.by_name.get(&name_key) {
            let existing = inner.policies[existing_id].clone();
            if existing.checksum == checksum {
                // Same content resubmitted: idempotent create.
                return Ok(existing);
            }
            return Err(PolicyStoreError::NameTaken {
                namespace: input.namespace,
                name: input.name,
            });
        }

        let now = Utc::now();
        let policy = Policy {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: input.name,
            namespace: input.namespace,
            description: input.description,
            version: 1,
            status: PolicyStatus::Draft,
            definition,
            checksum,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
            published_at: None,
        };
        inner.by_name.insert(name_key, policy.id.clone());
        inner.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn find_by_id(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Option<Policy>, PolicyStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .policies
            .get(id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_by_name(
        &self,
        tenant_id: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Policy>, PolicyStoreError> {
        let inner = self.inner.read().await;
        let key = (
            tenant_id.to_string(),
            namespace.to_string(),
            name.to_string(),
        );
        Ok(inner
            .by_name
            .get(&key)
            .and_then(|id| inner.policies.get(id))
            .cloned())
    }

    async fn update(
        &self,
        id: &str,
        tenant_id: &str,
        input: UpdatePolicyInput,
    ) -> Result<Policy, PolicyStoreError> {
        let parsed = match &input.definition {
            Some(doc) => Some(Self::parse_validated(doc)?),
            None => None,
        };

        let mut inner = self.inner.write().await;
        let current = inner
            .policies
            .get(id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| PolicyStoreError::NotFound { id: id.to_string() })?;

        // Idempotent update: identical definition and no status change is a
        // no-op that does not burn a version.
        if let Some((_, checksum)) = &parsed {
            if *checksum == current.checksum && input.status.is_none() {
                return Ok(current);
            }
        }

        let archived = PolicyVersion {
            id: Uuid::new_v4().to_string(),
            policy_id: current.id.clone(),
            version: current.version,
            definition: current.definition.clone(),
            checksum: current.checksum.clone(),
            change_summary: input.change_summary.clone(),
            created_by: input.updated_by.clone(),
            created_at: Utc::now(),
        };

        let mut next = current.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        if let Some((definition, checksum)) = parsed {
            next.definition = definition;
            next.checksum = checksum;
        }
        if let Some(description) = input.description {
            next.description = Some(description);
        }
        if let Some(status) = input.status {
            if status == PolicyStatus::Published && next.status != PolicyStatus::Published {
                next.published_at = Some(Utc::now());
            }
            next.status = status;
        }

        inner
            .versions
            .entry(current.id.clone())
            .or_default()
            .push(archived);
        inner.policies.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn publish(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError> {
        self.update(
            id,
            tenant_id,
            UpdatePolicyInput {
                status: Some(PolicyStatus::Published),
                ..Default::default()
            },
        )
        .await
    }

    async fn deprecate(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError> {
        self.update(
            id,
            tenant_id,
            UpdatePolicyInput {
                status: Some(PolicyStatus::Deprecated),
                ..Default::default()
            },
        )
        .await
    }

    async fn archive(&self, id: &str, tenant_id: &str) -> Result<Policy, PolicyStoreError> {
        self.update(
            id,
            tenant_id,
            UpdatePolicyInput {
                status: Some(PolicyStatus::Archived),
                ..Default::default()
            },
        )
        .await
    }

    async fn list(&self, filter: PolicyFilter) -> Result<Vec<Policy>, PolicyStoreError> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Policy> = inner
            .policies
            .values()
            .filter(|p| p.tenant_id == filter.tenant_id)
            .filter(|p| filter.namespace.as_deref().is_none_or(|ns| p.namespace == ns))
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .filter(|p| filter.name.as_deref().is_none_or(|n| p.name == n))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            (&a.namespace, &a.name, &a.id).cmp(&(&b.namespace, &b.name, &b.id))
        });
        Ok(matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn published_policies(
        &self,
        tenant_id: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Policy>, PolicyStoreError> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Policy> = inner
            .policies
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.status == PolicyStatus::Published)
            .filter(|p| namespace.is_none_or(|ns| p.namespace == ns))
            .cloned()
            .collect();
        matches.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(matches)
    }

    async fn version_history(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Vec<PolicyVersion>, PolicyStoreError> {
        let inner = self.inner.read().await;
        let visible = inner
            .policies
            .get(id)
            .is_some_and(|p| p.tenant_id == tenant_id);
        if !visible {
            return Ok(Vec::new());
        }
        Ok(inner.versions.get(id).cloned().unwrap_or_default())
    }
}
