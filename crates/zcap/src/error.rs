//! Verification error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Boxed error returned by external collaborators such as resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Verification errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The invocation proof carries no capability.
    #[error(r#""capability" was not found in the capability invocation proof"#)]
    MissingCapability,

    /// The delegation chain of the invoked capability is not valid.
    #[error("invalid capability chain: {0}")]
    Chain(#[from] ChainError),

    /// The invoker list of the capability could not be read.
    #[error("failed to fetch invokers: {0}")]
    Invokers(#[source] DocumentError),

    /// Neither the verification method nor its controller is an invoker.
    #[error("the authorized invoker does not match the verification method or its controller")]
    InvokerUnauthorized,

    /// A proof-purpose validator rejected the invocation proof.
    #[error("proof purpose validation failed: {0}")]
    ProofPurpose(#[from] PurposeError),

    /// The verifier options are invalid.
    #[error("invalid verifier options: {0}")]
    Options(String),

    /// An I/O error occurred while reading options.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a delegation chain fails verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    #[error(
        r#"capability action "{action}" is not allowed by the capability; allowed actions are: {allowed:?}"#
    )]
    ActionNotAllowed { action: String, allowed: Vec<String> },

    #[error(
        r#"capability action "{action}" does not match the expected capability action of "{expected}""#
    )]
    ActionMismatch { action: String, expected: String },

    #[error("malformed delegation chain: {0}")]
    Structure(#[from] DocumentError),

    #[error("failed to resolve root capability URI {uri}: {source}")]
    Resolution {
        uri: String,
        #[source]
        source: BoxError,
    },

    #[error(r#"expected target does not match root capability target: expected="{expected}" target="{actual}""#)]
    TargetMismatch { expected: String, actual: String },

    #[error("expected root capability does not match actual root capability: expected=({expected}) actual=({actual})")]
    RootMismatch { expected: String, actual: String },

    #[error("the root capability {id} must not specify a different invocation target ({target})")]
    RootIntegrity { id: String, target: String },

    #[error("root capability {id} expired at {expires}")]
    Expired { id: String, expires: DateTime<Utc> },

    #[error("root capability {id} carries caveat of unknown type {kind:?}")]
    UnknownCaveat { id: String, kind: String },

    #[error("caveat {kind:?} on root capability {id} is not satisfied: {reason}")]
    CaveatFailed {
        id: String,
        kind: String,
        reason: String,
    },

    /// More than one delegation hop remains after the root reference.
    #[error("multiple capability chains not supported yet ({depth} entries after the root)")]
    UnsupportedChainDepth { depth: usize },
}

/// Structural problems in a capability document.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("capability has {0} capabilityDelegation proofs, expected at most one")]
    AmbiguousDelegationProof(usize),

    #[error("first capabilityChain entry must be the root capability URI")]
    RootNotReference,

    #[error("capabilityChain entry {index} must be a URI; only the last entry may be embedded")]
    EmbeddedBeforeLast { index: usize },

    #[error("capability {0} lists itself in its own capabilityChain")]
    SelfReference(String),

    #[error(r#"last capabilityChain entry "{actual}" does not match parentCapability "{expected}""#)]
    ParentMismatch { expected: String, actual: String },

    #[error("capability declares parentCapability {0} but has no capabilityChain")]
    MissingChain(String),

    #[error("{field} contains an empty identifier")]
    EmptyIdentifier { field: &'static str },
}

/// Errors raised by proof-purpose validators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PurposeError {
    #[error("proof has no created timestamp")]
    MissingCreated,

    #[error("proof created at {created} is outside the accepted window ending {now}")]
    CreatedOutOfRange {
        created: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("verification method {method} has no controller")]
    MissingController { method: String },

    #[error("controller {controller} does not authorize {method} for capabilityInvocation")]
    NotAuthorizedByController { controller: String, method: String },

    #[error("failed to resolve controller {controller}: {source}")]
    ControllerResolution {
        controller: String,
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Rejected(String),
}

/// Errors from the in-memory capability set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("capability not found: {0}")]
    NotFound(String),

    #[error("capability {id} is malformed: {source}")]
    Malformed {
        id: String,
        #[source]
        source: DocumentError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
