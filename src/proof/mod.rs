//! Tamper-evident proof chain.
//!
//! Every significant state transition in the decision pipeline appends one
//! [`ProofEvent`] to the owning entity's hash-linked chain. Chains are
//! append-only and totally ordered per entity; batches of sealed events are
//! summarised into Merkle roots so callers can prove inclusion without
//! replaying the whole chain.
//!
//! The write path is split in two:
//!
//! * **Sealing** ([`ProofChain::append`]) is synchronous — it computes the
//!   event hash against the entity's current tail and stores the event, so
//!   the caller immediately holds the `proof_hash` its reply needs.
//! * **Delivery** to downstream sinks is asynchronous through a bounded
//!   queue with at-least-once semantics and id-based deduplication. A full
//!   queue degrades to synchronous delivery with a warning; events are never
//!   silently dropped.

pub mod emitter;
pub mod event;
pub mod ledger;
pub mod merkle;

pub use emitter::{MemorySink, ProofChain, ProofChainError, ProofSink, ProofSinkError};
pub use event::{ProofEvent, ProofKind, GENESIS_HASH};
pub use ledger::{verify, MemoryProofLedger, ProofBatch, ProofLedger, ProofLedgerError, VerifyReport};
pub use merkle::{merkle_root, merkle_root_with_paths, verify_inclusion, MerklePath};
