//! Trust signals: the event-sourced input stream of the trust engine.
//!
//! Signals arrive from instrumented runtimes and compliance tooling. The
//! server assigns ids and timestamps — client-supplied time is never
//! trusted — and ingestion enforces a per-source hourly rate limit plus
//! idempotency on `(source, idempotency_key)`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kinds of signal the engine understands. Anything else is dropped
/// with a warning — unknown types are never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ExecutionSuccess,
    ExecutionFailure,
    Quality,
    Efficiency,
    PolicyAdherence,
    PolicyViolation,
    AuditPass,
    Verification,
    Certification,
    Deployment,
}

impl SignalKind {
    /// Parse a wire label, e.g. `execution_success`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "execution_success" | "success" => Some(SignalKind::ExecutionSuccess),
            "execution_failure" | "failure" => Some(SignalKind::ExecutionFailure),
            "quality" => Some(SignalKind::Quality),
            "efficiency" => Some(SignalKind::Efficiency),
            "policy_adherence" => Some(SignalKind::PolicyAdherence),
            "policy_violation" => Some(SignalKind::PolicyViolation),
            "audit_pass" => Some(SignalKind::AuditPass),
            "verification" => Some(SignalKind::Verification),
            "certification" => Some(SignalKind::Certification),
            "deployment" => Some(SignalKind::Deployment),
            _ => None,
        }
    }

    /// Signals that reset the decay clock: successful execution, positive
    /// compliance, and re-verification.
    #[must_use]
    pub fn resets_decay(self) -> bool {
        matches!(
            self,
            SignalKind::ExecutionSuccess
                | SignalKind::PolicyAdherence
                | SignalKind::AuditPass
                | SignalKind::Verification
        )
    }
}

/// A stored, immutable trust signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSignal {
    pub id: String,
    pub entity_id: String,
    pub kind: SignalKind,
    pub value: i64,
    pub weight: f64,
    pub source: String,
    /// Server-assigned receipt time.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// Caller-supplied signal input. `id` and `timestamp` are assigned by the
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalInput {
    pub entity_id: String,
    /// Wire label resolved via [`SignalKind::parse`].
    pub signal_type: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Optional client idempotency key, deduplicated per source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Fixed-window per-source rate limiter (window = one clock hour).
pub struct SignalRateLimiter {
    limit_per_hour: u32,
    windows: Mutex<FxHashMap<String, (i64, u32)>>,
}

impl SignalRateLimiter {
    #[must_use]
    pub fn new(limit_per_hour: u32) -> Self {
        Self {
            limit_per_hour,
            windows: Mutex::new(FxHashMap::default()),
        }
    }

    /// Record one submission from `source`; `false` means the source is over
    /// its hourly budget.
    #[must_use]
    pub fn admit(&self, source: &str, now: DateTime<Utc>) -> bool {
        let bucket = now.timestamp().div_euclid(3600);
        let mut windows = self.windows.lock();
        let entry = windows.entry(source.to_string()).or_insert((bucket, 0));
        if entry.0 != bucket {
            *entry = (bucket, 0);
        }
        if entry.1 >= self.limit_per_hour {
            return false;
        }
        entry.1 += 1;
        true
    }
}
