//! Capability invocation verification.

use crate::{
    Capability, CapabilityInvocation, CapabilityResolver, CaveatContext, CaveatEvaluator,
    CaveatRegistry, ChainError, Error, Proof, ProofPurposeValidator, Result,
    VerificationMethod, VerifierOptions,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Verifies capability invocations against a trusted set of root capabilities.
///
/// Holds no mutable state; `verify` may be called concurrently when the
/// resolver allows it.
pub struct Verifier<R> {
    zcaps: R,
    caveats: CaveatRegistry,
    purposes: Vec<Box<dyn ProofPurposeValidator>>,
    clock: Clock,
    ignore_unknown_caveats: bool,
}

impl<R: CapabilityResolver> Verifier<R> {
    /// A verifier with the default caveat evaluators and no proof-purpose validators.
    pub fn new(zcaps: R) -> Self {
        Self::builder(zcaps).build()
    }

    pub fn builder(zcaps: R) -> VerifierBuilder<R> {
        VerifierBuilder {
            zcaps,
            caveats: CaveatRegistry::default(),
            purposes: Vec::new(),
            clock: Arc::new(Utc::now),
            ignore_unknown_caveats: false,
        }
    }

    /// Verify the proof against the invocation.
    pub fn verify(&self, proof: &Proof, invocation: &CapabilityInvocation) -> Result<()> {
        let Some(capability) = &proof.capability else {
            return Err(Error::MissingCapability);
        };

        let now = (self.clock)();
        let result = self.verify_capability(capability, proof, invocation, now);

        match &result {
            Ok(()) => debug!(
                capability = %capability.id,
                action = %proof.capability_action,
                method = %invocation.verification_method.id,
                "capability invocation verified"
            ),
            Err(err) => info!(
                capability = %capability.id,
                action = %proof.capability_action,
                method = %invocation.verification_method.id,
                error = %err,
                "capability invocation denied"
            ),
        }

        result
    }

    fn verify_capability(
        &self,
        capability: &Capability,
        proof: &Proof,
        invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.verify_capability_chain(capability, &proof.capability_action, invocation, now)?;

        // The authorized invoker must match the verification method itself
        // or the controller of the verification method.
        if !is_invoker(capability, &invocation.verification_method)? {
            return Err(Error::InvokerUnauthorized);
        }

        if self.purposes.is_empty() {
            debug!(
                capability = %capability.id,
                "no proof purpose validators configured; proof created time and controller authorization not checked"
            );
        }
        for validator in &self.purposes {
            validator.validate(proof, invocation, now)?;
        }

        Ok(())
    }

    fn verify_capability_chain(
        &self,
        capability: &Capability,
        intended_action: &str,
        invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ChainError> {
        if !capability.allowed_action.is_empty()
            && !intended_action.is_empty()
            && !capability.allowed_action.iter().any(|a| a == intended_action)
        {
            return Err(ChainError::ActionNotAllowed {
                action: intended_action.to_string(),
                allowed: capability.allowed_action.clone(),
            });
        }

        if invocation.expected_action != intended_action {
            return Err(ChainError::ActionMismatch {
                action: intended_action.to_string(),
                expected: invocation.expected_action.clone(),
            });
        }

        capability.validate_capability_chain()?;
        let chain = capability.capability_chain()?;

        // The root is always dereferenced, even when the invoked capability
        // claims to be the root, so a self-asserted root is never trusted.
        let is_root = chain.is_empty();
        // A validated chain always starts with a reference.
        let (root_uri, remaining) = match chain.split_first() {
            None => (capability.id.as_str(), &[][..]),
            Some((first, rest)) => (first.id(), rest),
        };

        let root = self
            .zcaps
            .resolve(root_uri)
            .map_err(|source| ChainError::Resolution {
                uri: root_uri.to_string(),
                source,
            })?;

        if let Some(expected) = non_empty(&invocation.expected_target) {
            if expected != root.invocation_target.id {
                return Err(ChainError::TargetMismatch {
                    expected: expected.to_string(),
                    actual: root.invocation_target.id.clone(),
                });
            }
        }

        self.verify_restrictions(&root, intended_action, invocation, now)?;

        match non_empty(&invocation.expected_root_capability) {
            Some(expected) if expected != root.id => {
                return Err(ChainError::RootMismatch {
                    expected: expected.to_string(),
                    actual: root.id.clone(),
                });
            }
            Some(_) => {}
            None if root.invocation_target.id != root.id => {
                return Err(ChainError::RootIntegrity {
                    id: root.id.clone(),
                    target: root.invocation_target.id.clone(),
                });
            }
            None => {}
        }

        if is_root {
            return Ok(());
        }

        // TODO: walk the remaining delegations once each hop can be resolved
        // and checked for attenuation against its parent.
        if !remaining.is_empty() {
            return Err(ChainError::UnsupportedChainDepth {
                depth: remaining.len(),
            });
        }

        // The delegated capability is bound by its own expiry and caveats
        // as well as the root's.
        self.verify_restrictions(capability, intended_action, invocation, now)
    }

    /// Expiry, then caveats, of a single capability.
    fn verify_restrictions(
        &self,
        capability: &Capability,
        intended_action: &str,
        invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ChainError> {
        if let Some(expires) = capability.expires.filter(|_| capability.is_expired(now)) {
            return Err(ChainError::Expired {
                id: capability.id.clone(),
                expires,
            });
        }

        self.verify_caveats(capability, intended_action, invocation, now)
    }

    fn verify_caveats(
        &self,
        capability: &Capability,
        intended_action: &str,
        invocation: &CapabilityInvocation,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ChainError> {
        let context = CaveatContext {
            capability,
            invocation,
            intended_action,
            now,
        };

        for caveat in &capability.caveats {
            let Some(evaluator) = self.caveats.get(&caveat.kind) else {
                if self.ignore_unknown_caveats {
                    warn!(capability = %capability.id, caveat = %caveat.kind, "skipping unknown caveat");
                    continue;
                }
                return Err(ChainError::UnknownCaveat {
                    id: capability.id.clone(),
                    kind: caveat.kind.clone(),
                });
            };

            evaluator
                .evaluate(caveat, &context)
                .map_err(|reason| ChainError::CaveatFailed {
                    id: capability.id.clone(),
                    kind: caveat.kind.clone(),
                    reason,
                })?;
        }

        Ok(())
    }
}

/// Whether `method` (or its controller) is an authorized invoker of `capability`.
///
/// An empty invoker list authorizes no one.
pub fn is_invoker(capability: &Capability, method: &VerificationMethod) -> Result<bool> {
    let invokers = capability.invokers().map_err(Error::Invokers)?;

    if invokers.is_empty() {
        return Ok(false);
    }

    let controller = method.controller.as_str();
    Ok(invokers.contains(&method.id.as_str())
        || (!controller.is_empty() && invokers.contains(&controller)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Builder for [`Verifier`].
pub struct VerifierBuilder<R> {
    zcaps: R,
    caveats: CaveatRegistry,
    purposes: Vec<Box<dyn ProofPurposeValidator>>,
    clock: Clock,
    ignore_unknown_caveats: bool,
}

impl<R: CapabilityResolver> VerifierBuilder<R> {
    /// Register an evaluator for a caveat type, replacing any existing one.
    pub fn with_caveat(
        mut self,
        kind: impl Into<String>,
        evaluator: impl CaveatEvaluator + 'static,
    ) -> Self {
        self.caveats.register(kind, evaluator);
        self
    }

    /// Replace the caveat registry.
    pub fn with_caveats(mut self, caveats: CaveatRegistry) -> Self {
        self.caveats = caveats;
        self
    }

    pub fn with_purpose_validator(mut self, validator: impl ProofPurposeValidator + 'static) -> Self {
        self.purposes.push(Box::new(validator));
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_options(mut self, options: &VerifierOptions) -> Self {
        if let Some(validator) = options.created_validator() {
            self.purposes.push(Box::new(validator));
        }
        self.ignore_unknown_caveats = options.ignore_unknown_caveats;
        self
    }

    pub fn build(self) -> Verifier<R> {
        Verifier {
            zcaps: self.zcaps,
            caveats: self.caveats,
            purposes: self.purposes,
            clock: self.clock,
            ignore_unknown_caveats: self.ignore_unknown_caveats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilitySet, Caveat, ChainEntry, PurposeError};
    use chrono::{Duration, TimeZone};

    const ALICE: &str = "did:ex:alice";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn verifier(caps: Vec<Capability>) -> Verifier<CapabilitySet> {
        Verifier::builder(CapabilitySet::try_from(caps).unwrap())
            .with_clock(fixed_now)
            .build()
    }

    fn root() -> Capability {
        Capability::root("urn:cap:root")
            .with_allowed_action("read")
            .with_invoker(ALICE)
    }

    fn read_by(method: &str) -> CapabilityInvocation {
        CapabilityInvocation::new("read", VerificationMethod::new(method))
    }

    #[test]
    fn test_missing_capability() {
        let v = verifier(vec![]);
        let err = v.verify(&Proof::default(), &read_by(ALICE)).unwrap_err();
        assert!(matches!(err, Error::MissingCapability));
    }

    #[test]
    fn test_root_invocation_succeeds() {
        let v = verifier(vec![root()]);
        assert!(v.verify(&Proof::new(root(), "read"), &read_by(ALICE)).is_ok());
    }

    #[test]
    fn test_action_not_allowed_precedes_mismatch() {
        let v = verifier(vec![root()]);
        let err = v
            .verify(&Proof::new(root(), "write"), &read_by(ALICE))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Chain(ChainError::ActionNotAllowed { ref action, .. }) if action == "write"
        ));
        assert!(err.to_string().starts_with("invalid capability chain: "));
    }

    #[test]
    fn test_empty_intended_action_skips_scoping() {
        let v = verifier(vec![root()]);
        let invocation = CapabilityInvocation::new("", VerificationMethod::new(ALICE));
        assert!(v.verify(&Proof::new(root(), ""), &invocation).is_ok());
    }

    #[test]
    fn test_root_is_always_resolved() {
        // The capability claims to be a root but the trusted set does not know it.
        let v = verifier(vec![]);
        let err = v
            .verify(&Proof::new(root(), "read"), &read_by(ALICE))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Chain(ChainError::Resolution { ref uri, .. }) if uri == "urn:cap:root"
        ));
    }

    #[test]
    fn test_delegated_one_hop() {
        let child = Capability::delegated(
            "urn:cap:child",
            &root(),
            vec![ChainEntry::Reference("urn:cap:root".into())],
        )
        .with_invoker("did:ex:bob");

        let v = verifier(vec![root()]);
        let proof = Proof::new(child, "read");
        assert!(v.verify(&proof, &read_by("did:ex:bob")).is_ok());
        assert!(matches!(
            v.verify(&proof, &read_by(ALICE)),
            Err(Error::InvokerUnauthorized)
        ));
    }

    #[test]
    fn test_target_check() {
        let v = verifier(vec![root()]);
        let proof = Proof::new(root(), "read");

        let ok = read_by(ALICE).with_expected_target("urn:cap:root");
        assert!(v.verify(&proof, &ok).is_ok());

        let bad = read_by(ALICE).with_expected_target("urn:other");
        assert!(matches!(
            v.verify(&proof, &bad),
            Err(Error::Chain(ChainError::TargetMismatch { .. }))
        ));

        let empty = read_by(ALICE).with_expected_target("");
        assert!(v.verify(&proof, &empty).is_ok());
    }

    #[test]
    fn test_root_with_foreign_target_needs_expected_root() {
        let edv_root = Capability::root("urn:cap:edv")
            .with_target("https://edv.example/docs/1")
            .with_invoker(ALICE);
        let v = verifier(vec![edv_root.clone()]);
        let proof = Proof::new(edv_root, "read");

        assert!(matches!(
            v.verify(&proof, &read_by(ALICE)),
            Err(Error::Chain(ChainError::RootIntegrity { .. }))
        ));
        assert!(v
            .verify(&proof, &read_by(ALICE).with_expected_root("urn:cap:edv"))
            .is_ok());
    }

    #[test]
    fn test_expired_root() {
        let expired = root().with_expires(fixed_now() - Duration::days(1));
        let v = verifier(vec![expired.clone()]);

        let err = v
            .verify(&Proof::new(expired, "read"), &read_by(ALICE))
            .unwrap_err();
        assert!(matches!(err, Error::Chain(ChainError::Expired { .. })));

        let valid = root().with_expires(fixed_now() + Duration::days(1));
        let v = verifier(vec![valid.clone()]);
        assert!(v.verify(&Proof::new(valid, "read"), &read_by(ALICE)).is_ok());
    }

    #[test]
    fn test_root_caveats() {
        let guarded = root().with_caveat(
            Caveat::new("ExpirationCaveat").with_param("expires", "2026-01-01T00:00:00Z"),
        );
        let v = verifier(vec![guarded.clone()]);
        assert!(matches!(
            v.verify(&Proof::new(guarded, "read"), &read_by(ALICE)),
            Err(Error::Chain(ChainError::CaveatFailed { .. }))
        ));

        let unknown = root().with_caveat(Caveat::new("GeoFenceCaveat"));
        let v = verifier(vec![unknown.clone()]);
        let proof = Proof::new(unknown.clone(), "read");
        assert!(matches!(
            v.verify(&proof, &read_by(ALICE)),
            Err(Error::Chain(ChainError::UnknownCaveat { .. }))
        ));

        fn inside(_: &Caveat, _: &CaveatContext<'_>) -> std::result::Result<(), String> {
            Ok(())
        }
        let v = Verifier::builder(CapabilitySet::try_from(vec![unknown]).unwrap())
            .with_caveat("GeoFenceCaveat", inside)
            .build();
        assert!(v.verify(&proof, &read_by(ALICE)).is_ok());
    }

    #[test]
    fn test_ignore_unknown_caveats_option() {
        let unknown = root().with_caveat(Caveat::new("GeoFenceCaveat"));
        let options = VerifierOptions {
            ignore_unknown_caveats: true,
            ..Default::default()
        };
        let v = Verifier::builder(CapabilitySet::try_from(vec![unknown.clone()]).unwrap())
            .with_options(&options)
            .build();
        assert!(v.verify(&Proof::new(unknown, "read"), &read_by(ALICE)).is_ok());
    }

    #[test]
    fn test_purpose_validators_run_after_invoker() {
        let options = VerifierOptions {
            max_proof_age_secs: Some(60),
            require_proof_created: true,
            ..Default::default()
        };
        let v = Verifier::builder(CapabilitySet::try_from(vec![root()]).unwrap())
            .with_clock(fixed_now)
            .with_options(&options)
            .build();

        let proof = Proof::new(root(), "read");
        assert!(matches!(
            v.verify(&proof, &read_by(ALICE)),
            Err(Error::ProofPurpose(PurposeError::MissingCreated))
        ));

        let proof = proof.with_created(fixed_now() - Duration::seconds(10));
        assert!(v.verify(&proof, &read_by(ALICE)).is_ok());

        // Invoker failure is reported before purpose validation.
        assert!(matches!(
            v.verify(&proof, &read_by("did:ex:mallory")),
            Err(Error::InvokerUnauthorized)
        ));
    }

    #[test]
    fn test_is_invoker_rules() {
        let cap = Capability::root("urn:cap:1").with_invoker("c1");

        assert!(is_invoker(&cap, &VerificationMethod::with_controller("m1", "c1")).unwrap());
        assert!(!is_invoker(&cap, &VerificationMethod::new("m1")).unwrap());
        assert!(!is_invoker(&cap, &VerificationMethod::new("c")).unwrap());
        assert!(!is_invoker(
            &Capability::root("urn:cap:1"),
            &VerificationMethod::new("urn:cap:1")
        )
        .unwrap());

        let malformed = Capability::root("urn:cap:1").with_invoker("");
        assert!(matches!(
            is_invoker(&malformed, &VerificationMethod::new("m1")),
            Err(Error::Invokers(_))
        ));
    }
}
