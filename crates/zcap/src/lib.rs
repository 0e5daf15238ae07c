//! Authorization capability (ZCAP) invocation verification.
//!
//! Core principle: **an invocation is allowed only when its capability traces
//! back to an independently resolved root and the signer is an authorized
//! invoker.**
//!
//! Signature checks and document parsing happen upstream; this crate decides
//! whether already-authenticated capability objects authorize an action.
//!
//! # Example
//!
//! ```
//! use zcap::{Capability, CapabilityInvocation, CapabilitySet, Proof, VerificationMethod, Verifier};
//!
//! let root = Capability::root("urn:cap:1")
//!     .with_allowed_action("read")
//!     .with_invoker("did:ex:alice");
//!
//! let mut trusted = CapabilitySet::new();
//! trusted.insert(root.clone())?;
//!
//! let verifier = Verifier::new(trusted);
//! let invocation = CapabilityInvocation::new("read", VerificationMethod::new("did:ex:alice"));
//! verifier.verify(&Proof::new(root, "read"), &invocation)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod capability;
mod caveat;
mod error;
mod invocation;
mod options;
mod purpose;
mod resolver;
mod verifier;

pub use capability::{
    CAPABILITY_DELEGATION, Capability, Caveat, ChainEntry, DelegationProof, InvocationTarget,
};
pub use caveat::{
    ALLOWED_ACTION_CAVEAT, AllowedActionCaveat, CaveatContext, CaveatEvaluator, CaveatRegistry,
    EXPIRATION_CAVEAT, ExpirationCaveat,
};
pub use error::{BoxError, ChainError, DocumentError, Error, PurposeError, ResolveError, Result};
pub use invocation::{CapabilityInvocation, Proof, VerificationMethod};
pub use options::VerifierOptions;
pub use purpose::{
    CAPABILITY_INVOCATION, ControllerAuthorizationValidator, ControllerResolver,
    ProofCreatedValidator, ProofPurposeValidator,
};
pub use resolver::{CapabilityResolver, CapabilitySet};
pub use verifier::{Clock, Verifier, VerifierBuilder, is_invoker};
