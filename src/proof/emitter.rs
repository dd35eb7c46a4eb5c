//! Proof-chain sealing and asynchronous sink delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event::{hash_fields, ProofEvent, ProofKind};
use super::ledger::{ProofBatch, ProofLedger, ProofLedgerError};
use super::merkle::merkle_root_with_paths;

/// Downstream consumer of sealed proof events (an external anchor, an audit
/// pipeline, a broker).
///
/// Delivery is at-least-once: a sink may see retries after transient errors
/// and must tolerate redelivery of an id it has already accepted.
#[async_trait]
pub trait ProofSink: Send + Sync {
    async fn deliver(&self, event: &ProofEvent) -> Result<(), ProofSinkError>;
}

/// Errors a sink may surface. All are treated as transient and retried with
/// capped backoff.
#[derive(Debug, thiserror::Error)]
#[error("proof sink unavailable: {message}")]
pub struct ProofSinkError {
    pub message: String,
}

/// In-memory sink collecting everything it receives. Used in tests and as a
/// default when no external anchor is configured.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<ProofEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered events, in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<ProofEvent> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ProofSink for MemorySink {
    async fn deliver(&self, event: &ProofEvent) -> Result<(), ProofSinkError> {
        self.delivered.lock().push(event.clone());
        Ok(())
    }
}

/// Errors from the proof chain write path.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ProofChainError {
    #[error(transparent)]
    #[diagnostic(code(wardgate::proof::ledger))]
    Ledger(#[from] ProofLedgerError),
}

const DELIVERY_RETRIES: u32 = 3;
const DELIVERY_BACKOFF: Duration = Duration::from_millis(50);

/// The proof chain: synchronous sealing against the ledger, asynchronous
/// delivery to the sink, Merkle batching of sealed events.
///
/// Sealing for one entity is serialised internally, so `append` may be called
/// concurrently for different agents without breaking any chain.
pub struct ProofChain {
    ledger: Arc<dyn ProofLedger>,
    sink: Arc<dyn ProofSink>,
    batch_size: usize,
    entity_locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    pending_batch: Mutex<Vec<(String, String)>>,
    tx: Mutex<Option<flume::Sender<ProofEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    degraded: AtomicU64,
}

impl ProofChain {
    /// Spawn the delivery worker and return the chain handle.
    ///
    /// `queue_capacity` bounds the delivery queue; when it is full the
    /// emitter degrades to synchronous delivery instead of dropping.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn ProofLedger>,
        sink: Arc<dyn ProofSink>,
        batch_size: usize,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = flume::bounded::<ProofEvent>(queue_capacity.max(1));
        let worker_sink = Arc::clone(&sink);
        let worker = tokio::spawn(async move {
            let mut seen: FxHashSet<String> = FxHashSet::default();
            while let Ok(event) = rx.recv_async().await {
                if !seen.insert(event.id.clone()) {
                    continue;
                }
                deliver_with_retry(worker_sink.as_ref(), &event).await;
            }
        });
        Self {
            ledger,
            sink,
            batch_size: batch_size.max(1),
            entity_locks: Mutex::new(FxHashMap::default()),
            pending_batch: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            degraded: AtomicU64::new(0),
        }
    }

    /// Seal and store an event at the current instant.
    pub async fn append(
        &self,
        tenant_id: &str,
        entity_id: &str,
        kind: ProofKind,
        payload: serde_json::Value,
    ) -> Result<ProofEvent, ProofChainError> {
        self.append_at(tenant_id, entity_id, kind, payload, Utc::now())
            .await
    }

    /// Seal and store an event with an explicit timestamp.
    ///
    /// The event is hash-linked to the entity's current tail, appended to the
    /// ledger, counted toward the current Merkle batch, and queued for sink
    /// delivery. The returned event carries the final hash.
    pub async fn append_at(
        &self,
        tenant_id: &str,
        entity_id: &str,
        kind: ProofKind,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<ProofEvent, ProofChainError> {
        let lock = self.entity_lock(entity_id);
        let _guard = lock.lock().await;

        let prev_hash = self.ledger.latest_hash(entity_id).await?;
        let id = Uuid::new_v4().to_string();
        let hash = hash_fields(
            &id, tenant_id, entity_id, kind, &payload, timestamp, &prev_hash,
        );
        let event = ProofEvent {
            id: id.clone(),
            tenant_id: tenant_id.to_string(),
            entity_id: entity_id.to_string(),
            kind,
            payload,
            timestamp,
            prev_hash,
            hash: hash.clone(),
        };
        self.ledger.append(event.clone()).await?;

        if let Some(batch) = self.push_to_batch(id, hash) {
            self.ledger.record_batch(batch).await?;
        }

        self.enqueue(event.clone()).await;
        Ok(event)
    }

    /// Flush any partial Merkle batch and stop the delivery worker. Events
    /// appended after shutdown are still sealed and delivered synchronously.
    pub async fn shutdown(&self) -> Result<(), ProofChainError> {
        if let Some(batch) = self.take_partial_batch() {
            self.ledger.record_batch(batch).await?;
        }
        let tx = self.tx.lock().take();
        drop(tx);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        Ok(())
    }

    /// Number of appends that had to bypass the queue and deliver inline.
    #[must_use]
    pub fn degraded_deliveries(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    fn entity_lock(&self, entity_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.entity_locks.lock();
        Arc::clone(
            locks
                .entry(entity_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn push_to_batch(&self, id: String, hash: String) -> Option<ProofBatch> {
        let mut pending = self.pending_batch.lock();
        pending.push((id, hash));
        if pending.len() < self.batch_size {
            return None;
        }
        let drained: Vec<(String, String)> = pending.drain(..).collect();
        drop(pending);
        Some(seal_batch(drained))
    }

    fn take_partial_batch(&self) -> Option<ProofBatch> {
        let mut pending = self.pending_batch.lock();
        if pending.is_empty() {
            return None;
        }
        let drained: Vec<(String, String)> = pending.drain(..).collect();
        drop(pending);
        Some(seal_batch(drained))
    }

    async fn enqueue(&self, event: ProofEvent) {
        let send_result = {
            let tx = self.tx.lock();
            match tx.as_ref() {
                Some(tx) => tx.try_send(event.clone()).map_err(|err| match err {
                    flume::TrySendError::Full(_) => "queue full",
                    flume::TrySendError::Disconnected(_) => "queue closed",
                }),
                None => Err("queue closed"),
            }
        };
        if let Err(reason) = send_result {
            self.degraded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                event_id = %event.id,
                reason,
                "proof delivery queue unavailable, delivering synchronously",
            );
            deliver_with_retry(self.sink.as_ref(), &event).await;
        }
    }
}

fn seal_batch(entries: Vec<(String, String)>) -> ProofBatch {
    let (event_ids, hashes): (Vec<String>, Vec<String>) = entries.into_iter().unzip();
    let (root, paths) =
        merkle_root_with_paths(&hashes).expect("batch is drained only when non-empty");
    ProofBatch {
        id: Uuid::new_v4().to_string(),
        root,
        event_ids,
        paths,
        sealed_at: Utc::now(),
    }
}

async fn deliver_with_retry(sink: &dyn ProofSink, event: &ProofEvent) {
    let mut backoff = DELIVERY_BACKOFF;
    for attempt in 0..=DELIVERY_RETRIES {
        match sink.deliver(event).await {
            Ok(()) => return,
            Err(err) if attempt < DELIVERY_RETRIES => {
                tracing::warn!(
                    event_id = %event.id,
                    attempt,
                    error = %err,
                    "proof delivery failed, retrying",
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
            Err(err) => {
                tracing::error!(
                    event_id = %event.id,
                    error = %err,
                    "proof delivery failed after retries; event remains sealed in the ledger",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ledger::{verify, MemoryProofLedger};
    use serde_json::json;

    fn chain_with(batch_size: usize) -> (Arc<MemoryProofLedger>, Arc<MemorySink>, ProofChain) {
        let ledger = Arc::new(MemoryProofLedger::new());
        let sink = Arc::new(MemorySink::new());
        let chain = ProofChain::new(
            Arc::clone(&ledger) as Arc<dyn ProofLedger>,
            Arc::clone(&sink) as Arc<dyn ProofSink>,
            batch_size,
            64,
        );
        (ledger, sink, chain)
    }

    #[tokio::test]
    async fn events_link_per_entity() {
        let (_ledger, _sink, chain) = chain_with(8);
        let e1 = chain
            .append("t1", "ag_A", ProofKind::IntentReceived, json!({"n": 1}))
            .await
            .unwrap();
        let e2 = chain
            .append("t1", "ag_A", ProofKind::DecisionMade, json!({"n": 2}))
            .await
            .unwrap();
        let other = chain
            .append("t1", "ag_B", ProofKind::IntentReceived, json!({}))
            .await
            .unwrap();

        assert_eq!(e1.prev_hash, crate::proof::GENESIS_HASH);
        assert_eq!(e2.prev_hash, e1.hash);
        assert_eq!(other.prev_hash, crate::proof::GENESIS_HASH);
    }

    #[tokio::test]
    async fn verify_walks_to_genesis() {
        let (ledger, _sink, chain) = chain_with(8);
        let mut last = None;
        for n in 0..5 {
            last = Some(
                chain
                    .append("t1", "ag_A", ProofKind::TrustDelta, json!({"n": n}))
                    .await
                    .unwrap(),
            );
        }
        let report = verify(ledger.as_ref(), &last.unwrap().hash).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.depth, 5);
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let (ledger, _sink, chain) = chain_with(8);
        let _e1 = chain
            .append("t1", "ag_A", ProofKind::IntentReceived, json!({"v": 1}))
            .await
            .unwrap();
        let e2 = chain
            .append("t1", "ag_A", ProofKind::DecisionMade, json!({"v": 2}))
            .await
            .unwrap();
        let e3 = chain
            .append("t1", "ag_A", ProofKind::TrustDelta, json!({"v": 3}))
            .await
            .unwrap();

        ledger.tamper(&e2.hash, json!({"v": 999})).await;
        let report = verify(ledger.as_ref(), &e3.hash).await.unwrap();
        assert!(!report.valid);
    }

    #[tokio::test]
    async fn batches_seal_at_configured_size() {
        let (ledger, _sink, chain) = chain_with(3);
        for n in 0..7 {
            chain
                .append("t1", "ag_A", ProofKind::TrustDelta, json!({"n": n}))
                .await
                .unwrap();
        }
        let batches = ledger.batches().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.event_ids.len() == 3));

        chain.shutdown().await.unwrap();
        let batches = ledger.batches().await.unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].event_ids.len(), 1);
    }

    #[tokio::test]
    async fn delivery_reaches_sink() {
        let (_ledger, sink, chain) = chain_with(8);
        chain
            .append("t1", "ag_A", ProofKind::IntentReceived, json!({}))
            .await
            .unwrap();
        chain.shutdown().await.unwrap();
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn append_after_shutdown_delivers_inline() {
        let (_ledger, sink, chain) = chain_with(8);
        chain.shutdown().await.unwrap();
        chain
            .append("t1", "ag_A", ProofKind::IntentReceived, json!({}))
            .await
            .unwrap();
        assert_eq!(sink.delivered().len(), 1);
        assert_eq!(chain.degraded_deliveries(), 1);
    }
}
