//! Proof ledger storage seam and its in-memory reference implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::event::{ProofEvent, GENESIS_HASH};
use super::merkle::MerklePath;

/// A recorded batch: the Merkle root over a run of sealed events, with the
/// per-event inclusion paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBatch {
    pub id: String,
    pub root: String,
    pub event_ids: Vec<String>,
    pub paths: Vec<MerklePath>,
    pub sealed_at: DateTime<Utc>,
}

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ProofLedgerError {
    #[error("event not found: {hash}")]
    #[diagnostic(code(wardgate::proof::not_found))]
    NotFound { hash: String },

    #[error("backend error: {message}")]
    #[diagnostic(code(wardgate::proof::backend))]
    Backend { message: String },
}

/// Result of walking a chain back to genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub valid: bool,
    /// Number of events between the queried event and genesis, inclusive.
    pub depth: usize,
    pub genesis_hash: String,
}

/// Append-only storage for proof events.
///
/// Implementations must preserve per-entity insertion order — the chain is
/// the order of appends.
#[async_trait]
pub trait ProofLedger: Send + Sync {
    /// Append a sealed event. Appends are idempotent on event id.
    async fn append(&self, event: ProofEvent) -> Result<(), ProofLedgerError>;

    /// Hash of the most recent event for an entity, or the genesis hash.
    async fn latest_hash(&self, entity_id: &str) -> Result<String, ProofLedgerError>;

    /// All events for an entity, oldest first.
    async fn events_for_entity(&self, entity_id: &str) -> Result<Vec<ProofEvent>, ProofLedgerError>;

    /// Look up a single event by its hash.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<ProofEvent>, ProofLedgerError>;

    /// Record a sealed Merkle batch.
    async fn record_batch(&self, batch: ProofBatch) -> Result<(), ProofLedgerError>;

    /// Batches recorded so far, oldest first.
    async fn batches(&self) -> Result<Vec<ProofBatch>, ProofLedgerError>;
}

/// Walk an entity's chain from the event with `event_hash` back to genesis,
/// recomputing every hash and link on the way.
///
/// The report is `valid` only when every event's stored hash matches its
/// recomputed hash and every `prev_hash` links to the predecessor.
pub async fn verify(
    ledger: &dyn ProofLedger,
    event_hash: &str,
) -> Result<VerifyReport, ProofLedgerError> {
    let target = ledger
        .find_by_hash(event_hash)
        .await?
        .ok_or_else(|| ProofLedgerError::NotFound {
            hash: event_hash.to_string(),
        })?;

    let chain = ledger.events_for_entity(&target.entity_id).await?;
    let mut valid = true;
    let mut depth = 0;
    let mut genesis_hash = String::from(GENESIS_HASH);
    let mut expected_prev = GENESIS_HASH.to_string();

    for event in &chain {
        if event.prev_hash != expected_prev || !event.is_intact() {
            valid = false;
        }
        expected_prev = event.hash.clone();
        depth += 1;
        if depth == 1 {
            genesis_hash = event.hash.clone();
        }
        if event.hash == target.hash {
            break;
        }
    }

    Ok(VerifyReport {
        valid,
        depth,
        genesis_hash,
    })
}

#[derive(Default)]
struct Inner {
    by_entity: FxHashMap<String, Vec<ProofEvent>>,
    by_hash: FxHashMap<String, ProofEvent>,
    seen_ids: FxHashSet<String>,
    batches: Vec<ProofBatch>,
}

/// Volatile in-process ledger, suitable for tests and single-node runs.
#[derive(Default)]
pub struct MemoryProofLedger {
    inner: RwLock<Inner>,
}

impl MemoryProofLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored event's payload in place, bypassing the append-only
    /// contract. Exists so tamper-detection can be exercised against this
    /// backend; real backends have no such operation.
    pub async fn tamper(&self, hash: &str, payload: serde_json::Value) {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.by_hash.get_mut(hash) {
            event.payload = payload.clone();
        }
        for events in inner.by_entity.values_mut() {
            for event in events.iter_mut() {
                if event.hash == hash {
                    event.payload = payload.clone();
                }
            }
        }
    }
}

#[async_trait]
impl ProofLedger for MemoryProofLedger {
    async fn append(&self, event: ProofEvent) -> Result<(), ProofLedgerError> {
        let mut inner = self.inner.write().await;
        if inner.seen_ids.contains(&event.id) {
            return Ok(());
        }
        inner.seen_ids.insert(event.id.clone());
        inner.by_hash.insert(event.hash.clone(), event.clone());
        inner
            .by_entity
            .entry(event.entity_id.clone())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn latest_hash(&self, entity_id: &str) -> Result<String, ProofLedgerError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_entity
            .get(entity_id)
            .and_then(|events| events.last())
            .map(|event| event.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    async fn events_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<ProofEvent>, ProofLedgerError> {
        let inner = self.inner.read().await;
        Ok(inner.by_entity.get(entity_id).cloned().unwrap_or_default())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<ProofEvent>, ProofLedgerError> {
        let inner = self.inner.read().await;
        Ok(inner.by_hash.get(hash).cloned())
    }

    async fn record_batch(&self, batch: ProofBatch) -> Result<(), ProofLedgerError> {
        let mut inner = self.inner.write().await;
        inner.batches.push(batch);
        Ok(())
    }

    async fn batches(&self) -> Result<Vec<ProofBatch>, ProofLedgerError> {
        let inner = self.inner.read().await;
        Ok(inner.batches.clone())
    }
}
