//! Security subsystem: tier-indexed requirements and the pre-request gate.

pub mod gate;
pub mod requirements;

pub use gate::{
    is_high_value, AccessToken, AllowAllIntrospector, AttestationVerifier,
    DigestAttestationVerifier, GateError, MemoryRevocationList, PreCheckOutcome, RequestBinding,
    RevocationChecker, SecurityCredentials, SecurityGate, TokenIntrospector, VerifierError,
};
pub use requirements::{
    AttestationRequirement, BindingRequirement, PairwiseRequirement, RevocationRequirement,
    TierRequirements, DEFAULT_TOKEN_TTL_MINUTES,
};
