//! Proof-purpose validation for capability invocations.
//!
//! The chain and invoker checks do not look at when the invocation proof was
//! created, nor whether the controller of the signing key authorizes that key
//! for `capabilityInvocation`. Those policies plug in here.

use crate::{BoxError, CapabilityInvocation, Proof, PurposeError};
use chrono::{DateTime, Duration, Utc};

/// Verification relationship a controller must list the signing key under.
pub const CAPABILITY_INVOCATION: &str = "capabilityInvocation";

/// An additional check run after the chain and invoker checks pass.
pub trait ProofPurposeValidator: Send + Sync {
    fn validate(
        &self,
        proof: &Proof,
        invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> Result<(), PurposeError>;
}

/// Accepts proofs created within `max_age` of now, in either direction.
#[derive(Debug, Clone, Copy)]
pub struct ProofCreatedValidator {
    pub max_age: Duration,
    pub require_created: bool,
}

impl ProofCreatedValidator {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            require_created: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.require_created = true;
        self
    }
}

impl ProofPurposeValidator for ProofCreatedValidator {
    fn validate(
        &self,
        proof: &Proof,
        _invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> Result<(), PurposeError> {
        let Some(created) = proof.created else {
            return if self.require_created {
                Err(PurposeError::MissingCreated)
            } else {
                Ok(())
            };
        };

        if (now - created).abs() > self.max_age {
            return Err(PurposeError::CreatedOutOfRange { created, now });
        }
        Ok(())
    }
}

/// Looks up the verification methods a controller authorizes for a relationship.
pub trait ControllerResolver: Send + Sync {
    fn authorized_methods(
        &self,
        controller: &str,
        relationship: &str,
    ) -> Result<Vec<String>, BoxError>;
}

/// Requires the signing method to be authorized by its controller.
#[derive(Debug, Clone)]
pub struct ControllerAuthorizationValidator<C> {
    controllers: C,
}

impl<C: ControllerResolver> ControllerAuthorizationValidator<C> {
    pub fn new(controllers: C) -> Self {
        Self { controllers }
    }
}

impl<C: ControllerResolver> ProofPurposeValidator for ControllerAuthorizationValidator<C> {
    fn validate(
        &self,
        _proof: &Proof,
        invocation: &CapabilityInvocation,
        _now: DateTime<Utc>,
    ) -> Result<(), PurposeError> {
        let method = &invocation.verification_method;
        if method.controller.is_empty() {
            return Err(PurposeError::MissingController {
                method: method.id.clone(),
            });
        }

        let authorized = self
            .controllers
            .authorized_methods(&method.controller, CAPABILITY_INVOCATION)
            .map_err(|source| PurposeError::ControllerResolution {
                controller: method.controller.clone(),
                source,
            })?;

        if !authorized.iter().any(|id| *id == method.id) {
            return Err(PurposeError::NotAuthorizedByController {
                controller: method.controller.clone(),
                method: method.id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Capability, VerificationMethod};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn invocation(method: VerificationMethod) -> CapabilityInvocation {
        CapabilityInvocation::new("read", method)
    }

    #[test]
    fn test_created_window() {
        let validator = ProofCreatedValidator::new(Duration::minutes(5));
        let inv = invocation(VerificationMethod::new("did:ex:a#key"));
        let proof = Proof::new(Capability::root("urn:cap:1"), "read");

        assert!(validator.validate(&proof, &inv, now()).is_ok());

        let fresh = proof.clone().with_created(now() - Duration::minutes(1));
        assert!(validator.validate(&fresh, &inv, now()).is_ok());

        let stale = proof.clone().with_created(now() - Duration::hours(1));
        assert!(matches!(
            validator.validate(&stale, &inv, now()),
            Err(PurposeError::CreatedOutOfRange { .. })
        ));

        let future = proof.clone().with_created(now() + Duration::hours(1));
        assert!(validator.validate(&future, &inv, now()).is_err());

        assert!(matches!(
            validator.required().validate(&proof, &inv, now()),
            Err(PurposeError::MissingCreated)
        ));
    }

    struct Controllers(HashMap<String, Vec<String>>);

    impl ControllerResolver for Controllers {
        fn authorized_methods(
            &self,
            controller: &str,
            relationship: &str,
        ) -> Result<Vec<String>, BoxError> {
            assert_eq!(relationship, CAPABILITY_INVOCATION);
            self.0
                .get(controller)
                .cloned()
                .ok_or_else(|| format!("unknown controller {controller}").into())
        }
    }

    #[test]
    fn test_controller_authorization() {
        let validator = ControllerAuthorizationValidator::new(Controllers(HashMap::from([(
            "did:ex:alice".to_string(),
            vec!["did:ex:alice#key-1".to_string()],
        )])));
        let proof = Proof::default();

        let ok = invocation(VerificationMethod::with_controller(
            "did:ex:alice#key-1",
            "did:ex:alice",
        ));
        assert!(validator.validate(&proof, &ok, now()).is_ok());

        let other_key = invocation(VerificationMethod::with_controller(
            "did:ex:alice#key-2",
            "did:ex:alice",
        ));
        assert!(matches!(
            validator.validate(&proof, &other_key, now()),
            Err(PurposeError::NotAuthorizedByController { .. })
        ));

        let unknown = invocation(VerificationMethod::with_controller(
            "did:ex:bob#key-1",
            "did:ex:bob",
        ));
        assert!(matches!(
            validator.validate(&proof, &unknown, now()),
            Err(PurposeError::ControllerResolution { .. })
        ));

        let orphan = invocation(VerificationMethod::new("did:ex:alice#key-1"));
        assert!(matches!(
            validator.validate(&proof, &orphan, now()),
            Err(PurposeError::MissingController { .. })
        ));
    }
}
