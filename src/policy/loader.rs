//! Policy loader: serves the evaluator the published policy set for a tenant
//! with a two-level cache.
//!
//! * **L1** — in-process map keyed `tenant` or `tenant:namespace`, TTL-based.
//! * **L2** — a [`SharedCache`] backend (in-memory by default, Redis behind
//!   the `cache-redis` feature) holding the same entries as JSON.
//!
//! Reads go L1 → L2 → store. On a store read the L1 entry is written
//! synchronously and the L2 entry fire-and-forget — an L2 write failure is a
//! warning, never an error. Invalidation after any store mutation affecting
//! published state is mandatory; [`PolicyLoader::invalidate`] clears both
//! levels plus the tenant's all-namespaces key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock as AsyncRwLock;

use crate::policy::definition::Policy;
use crate::policy::store::{PolicyStore, PolicyStoreError};

/// Errors surfaced by the loader. Cache failures never propagate; only the
/// backing store can fail a load.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LoaderError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] PolicyStoreError),
}

/// Errors from a shared-cache backend. Always treated as soft failures.
#[derive(Debug, thiserror::Error)]
#[error("shared cache error: {message}")]
pub struct SharedCacheError {
    pub message: String,
}

/// L2 cache seam.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), SharedCacheError>;
    async fn delete(&self, key: &str) -> Result<(), SharedCacheError>;
    async fn clear(&self) -> Result<(), SharedCacheError>;
}

/// In-memory L2 backend with entry-level TTLs.
#[derive(Default)]
pub struct MemorySharedCache {
    entries: AsyncRwLock<FxHashMap<String, (String, Instant)>>,
}

impl MemorySharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), SharedCacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SharedCacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SharedCacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Redis-backed L2 cache.
#[cfg(feature = "cache-redis")]
pub struct RedisSharedCache {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "cache-redis")]
impl RedisSharedCache {
    /// Connect to a Redis instance, e.g. `redis://127.0.0.1/`.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] when the client cannot be created or the
    /// connection manager cannot be established.
    pub async fn connect(url: &str) -> Result<Self, SharedCacheError> {
        let client = redis::Client::open(url).map_err(|err| SharedCacheError {
            message: err.to_string(),
        })?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| SharedCacheError {
                message: err.to_string(),
            })?;
        Ok(Self { conn })
    }
}

#[cfg(feature = "cache-redis")]
#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|err| SharedCacheError {
                message: err.to_string(),
            })
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), SharedCacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| SharedCacheError {
                message: err.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), SharedCacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| SharedCacheError {
                message: err.to_string(),
            })
    }

    async fn clear(&self) -> Result<(), SharedCacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| SharedCacheError {
                message: err.to_string(),
            })
    }
}

/// Cache hit/miss counters, per tenant plus totals.
#[derive(Default)]
pub struct LoaderMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    per_tenant: parking_lot::Mutex<FxHashMap<String, (u64, u64)>>,
}

impl LoaderMetrics {
    fn record(&self, tenant_id: &str, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        let mut per_tenant = self.per_tenant.lock();
        let entry = per_tenant.entry(tenant_id.to_string()).or_insert((0, 0));
        if hit {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// `(hits, misses)` for one tenant.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: &str) -> (u64, u64) {
        self.per_tenant
            .lock()
            .get(tenant_id)
            .copied()
            .unwrap_or((0, 0))
    }
}

struct L1Entry {
    policies: Arc<Vec<Policy>>,
    expires_at: Instant,
}

/// Two-level cached view over [`PolicyStore::published_policies`].
pub struct PolicyLoader {
    store: Arc<dyn PolicyStore>,
    shared: Arc<dyn SharedCache>,
    ttl: Duration,
    l1: RwLock<FxHashMap<String, L1Entry>>,
    metrics: LoaderMetrics,
}

impl PolicyLoader {
    /// Default entry TTL in seconds.
    pub const DEFAULT_TTL_SECS: u64 = 300;

    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, shared: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        Self {
            store,
            shared,
            ttl,
            l1: RwLock::new(FxHashMap::default()),
            metrics: LoaderMetrics::default(),
        }
    }

    fn cache_key(tenant_id: &str, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("{tenant_id}:{ns}"),
            None => tenant_id.to_string(),
        }
    }

    /// Published policies for `(tenant, namespace?)`, cached.
    ///
    /// # Errors
    ///
    /// Only a backing-store failure surfaces; cache trouble degrades to a
    /// store read.
    pub async fn load(
        &self,
        tenant_id: &str,
        namespace: Option<&str>,
    ) -> Result<Arc<Vec<Policy>>, LoaderError> {
        let key = Self::cache_key(tenant_id, namespace);

        if let Some(policies) = self.l1_get(&key) {
            self.metrics.record(tenant_id, true);
            return Ok(policies);
        }

        match self.shared.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<Policy>>(&json) {
                Ok(policies) => {
                    let policies = Arc::new(policies);
                    self.l1_put(&key, Arc::clone(&policies));
                    self.metrics.record(tenant_id, true);
                    return Ok(policies);
                }
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "corrupt shared-cache entry, refreshing");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "shared cache read failed");
            }
        }

        self.metrics.record(tenant_id, false);
        let policies = Arc::new(self.store.published_policies(tenant_id, namespace).await?);
        self.l1_put(&key, Arc::clone(&policies));

        // Fire-and-forget the L2 write.
        match serde_json::to_string(policies.as_ref()) {
            Ok(json) => {
                let shared = Arc::clone(&self.shared);
                let ttl = self.ttl;
                let key_owned = key.clone();
                tokio::spawn(async move {
                    if let Err(err) = shared.set(&key_owned, json, ttl).await {
                        tracing::warn!(key = %key_owned, error = %err, "shared cache write failed");
                    }
                });
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "policy set failed to serialize for L2");
            }
        }

        Ok(policies)
    }

    /// Drop cached entries for `(tenant, namespace?)`. A namespace
    /// invalidation also drops the tenant's all-namespaces entry; a bare
    /// tenant invalidation drops every entry of that tenant.
    pub async fn invalidate(&self, tenant_id: &str, namespace: Option<&str>) {
        let mut keys = vec![Self::cache_key(tenant_id, None)];
        match namespace {
            Some(ns) => keys.push(Self::cache_key(tenant_id, Some(ns))),
            None => {
                let prefix = format!("{tenant_id}:");
                let l1 = self.l1.read();
                keys.extend(l1.keys().filter(|k| k.starts_with(&prefix)).cloned());
            }
        }

        {
            let mut l1 = self.l1.write();
            for key in &keys {
                l1.remove(key);
            }
        }
        for key in &keys {
            if let Err(err) = self.shared.delete(key).await {
                tracing::warn!(key = %key, error = %err, "shared cache invalidation failed");
            }
        }
    }

    /// Clear every cached entry (hot-reload).
    pub async fn invalidate_all(&self) {
        self.l1.write().clear();
        if let Err(err) = self.shared.clear().await {
            tracing::warn!(error = %err, "shared cache clear failed");
        }
    }

    /// Warm caches for a tenant. Latency-only; failures are logged and
    /// swallowed.
    pub async fn preload(&self, tenant_id: &str, namespaces: &[&str]) {
        if let Err(err) = self.load(tenant_id, None).await {
            tracing::warn!(tenant_id, error = %err, "preload failed");
        }
        for ns in namespaces.iter().copied() {
            if let Err(err) = self.load(tenant_id, Some(ns)).await {
                tracing::warn!(tenant_id, namespace = ns, error = %err, "preload failed");
            }
        }
    }

    /// Hit/miss counters.
    #[must_use]
    pub fn metrics(&self) -> &LoaderMetrics {
        &self.metrics
    }

    fn l1_get(&self, key: &str) -> Option<Arc<Vec<Policy>>> {
        let l1 = self.l1.read();
        l1.get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| Arc::clone(&entry.policies))
    }

    fn l1_put(&self, key: &str, policies: Arc<Vec<Policy>>) {
        let mut l1 = self.l1.write();
        l1.insert(
            key.to_string(),
            L1Entry {
                policies,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}
