//! Trust subsystem: signal ingestion, score composition, time decay, and
//! effective-trust derivation.

pub mod engine;
pub mod signal;
pub mod store;

pub use engine::{
    compose_effective, composite_score, DecaySchedule, DeploymentContext, EffectiveTrust,
    SignalOutcome, TrustEngine, TrustError,
};
pub use signal::{SignalInput, SignalKind, SignalRateLimiter, TrustSignal};
pub use store::{
    effective_certification, AgentRecord, AgentStatus, Attestation, BehavioralStats,
    ComplianceStats, ContextSignals, IdentitySignals, MemoryTrustStore, TrustHistoryEntry,
    TrustProfile, TrustStore, TrustStoreError,
};
