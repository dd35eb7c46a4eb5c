//! Decision pipeline: the request/reply contract and the coordinator that
//! drives security gate → trust → policy evaluation → escalation → proof.

pub mod coordinator;
pub mod request;

pub use coordinator::{CoordinatorBuilder, DecisionCoordinator, DecisionError};
pub use request::{DecisionReply, DecisionRequest, Intent, TrustSummary};
