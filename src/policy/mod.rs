//! Policy subsystem: the condition model, the versioned store, the cached
//! loader, and the pure evaluator.

pub mod condition;
pub mod definition;
pub mod evaluator;
pub mod loader;
pub mod store;

pub use condition::{Condition, CompoundOp, ConditionContext, FieldOp, TimeField};
pub use definition::{
    compute_checksum, validate_definition, EscalationDirective, Policy, PolicyAction,
    PolicyDefinition, PolicyRule, PolicyStatus, PolicyTarget, PolicyVersion, TimeoutSpec,
};
pub use evaluator::{
    EntityContext, EnvironmentContext, EvaluationContext, EvaluationOutcome, IntentContext,
    PolicyEvaluation, PolicyEvaluator,
};
pub use loader::{
    LoaderError, LoaderMetrics, MemorySharedCache, PolicyLoader, SharedCache, SharedCacheError,
};
pub use store::{
    CreatePolicyInput, MemoryPolicyStore, PolicyFilter, PolicyStore, PolicyStoreError,
    UpdatePolicyInput,
};

#[cfg(feature = "cache-redis")]
pub use loader::RedisSharedCache;
