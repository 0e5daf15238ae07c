//! Caveat evaluation against the invocation being verified.

use crate::{Capability, CapabilityInvocation, Caveat};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const EXPIRATION_CAVEAT: &str = "ExpirationCaveat";
pub const ALLOWED_ACTION_CAVEAT: &str = "AllowedActionCaveat";

/// What a caveat is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CaveatContext<'a> {
    pub capability: &'a Capability,
    pub invocation: &'a CapabilityInvocation,
    pub intended_action: &'a str,
    pub now: DateTime<Utc>,
}

/// A predicate for one caveat type.
///
/// Returns the reason the caveat is not satisfied.
pub trait CaveatEvaluator: Send + Sync {
    fn evaluate(&self, caveat: &Caveat, context: &CaveatContext<'_>) -> Result<(), String>;
}

impl<F> CaveatEvaluator for F
where
    F: Fn(&Caveat, &CaveatContext<'_>) -> Result<(), String> + Send + Sync,
{
    fn evaluate(&self, caveat: &Caveat, context: &CaveatContext<'_>) -> Result<(), String> {
        self(caveat, context)
    }
}

/// Rejects invocations after the `expires` timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpirationCaveat;

impl CaveatEvaluator for ExpirationCaveat {
    fn evaluate(&self, caveat: &Caveat, context: &CaveatContext<'_>) -> Result<(), String> {
        let expires = caveat
            .params
            .get("expires")
            .and_then(Value::as_str)
            .ok_or("missing \"expires\"")?;
        let expires = DateTime::parse_from_rfc3339(expires)
            .map_err(|e| format!("invalid \"expires\": {e}"))?
            .with_timezone(&Utc);

        if expires < context.now {
            return Err(format!("expired at {expires}"));
        }
        Ok(())
    }
}

/// Narrows the actions a capability may be invoked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowedActionCaveat;

impl CaveatEvaluator for AllowedActionCaveat {
    fn evaluate(&self, caveat: &Caveat, context: &CaveatContext<'_>) -> Result<(), String> {
        let allowed: Vec<&str> = match caveat.params.get("allowedAction") {
            Some(Value::String(action)) => vec![action.as_str()],
            Some(Value::Array(actions)) => actions.iter().filter_map(Value::as_str).collect(),
            _ => return Err("missing \"allowedAction\"".to_string()),
        };

        if !allowed.contains(&context.intended_action) {
            return Err(format!(
                "action {:?} not in {allowed:?}",
                context.intended_action
            ));
        }
        Ok(())
    }
}

/// Evaluators keyed by caveat type.
#[derive(Clone)]
pub struct CaveatRegistry {
    evaluators: HashMap<String, Arc<dyn CaveatEvaluator>>,
}

impl CaveatRegistry {
    /// A registry with no evaluators; every caveat is unknown.
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, evaluator: impl CaveatEvaluator + 'static) {
        self.evaluators.insert(kind.into(), Arc::new(evaluator));
    }

    pub fn get(&self, kind: &str) -> Option<&dyn CaveatEvaluator> {
        self.evaluators.get(kind).map(Arc::as_ref)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(String::as_str)
    }
}

impl Default for CaveatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EXPIRATION_CAVEAT, ExpirationCaveat);
        registry.register(ALLOWED_ACTION_CAVEAT, AllowedActionCaveat);
        registry
    }
}

impl std::fmt::Debug for CaveatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerificationMethod;
    use chrono::TimeZone;

    fn context<'a>(
        capability: &'a Capability,
        invocation: &'a CapabilityInvocation,
    ) -> CaveatContext<'a> {
        CaveatContext {
            capability,
            invocation,
            intended_action: &invocation.expected_action,
            now: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_expiration_caveat() {
        let cap = Capability::root("urn:cap:1");
        let inv = CapabilityInvocation::new("read", VerificationMethod::new("did:ex:a"));
        let ctx = context(&cap, &inv);

        let future = Caveat::new(EXPIRATION_CAVEAT).with_param("expires", "2027-01-01T00:00:00Z");
        assert!(ExpirationCaveat.evaluate(&future, &ctx).is_ok());

        let past = Caveat::new(EXPIRATION_CAVEAT).with_param("expires", "2025-01-01T00:00:00Z");
        assert!(ExpirationCaveat.evaluate(&past, &ctx).is_err());

        let missing = Caveat::new(EXPIRATION_CAVEAT);
        assert_eq!(
            ExpirationCaveat.evaluate(&missing, &ctx),
            Err("missing \"expires\"".to_string())
        );
    }

    #[test]
    fn test_allowed_action_caveat() {
        let cap = Capability::root("urn:cap:1");
        let inv = CapabilityInvocation::new("write", VerificationMethod::new("did:ex:a"));
        let ctx = context(&cap, &inv);

        let caveat = Caveat::new(ALLOWED_ACTION_CAVEAT).with_param("allowedAction", "read");
        assert!(AllowedActionCaveat.evaluate(&caveat, &ctx).is_err());

        let caveat = Caveat::new(ALLOWED_ACTION_CAVEAT)
            .with_param("allowedAction", serde_json::json!(["read", "write"]));
        assert!(AllowedActionCaveat.evaluate(&caveat, &ctx).is_ok());
    }

    #[test]
    fn test_registry_defaults_and_custom() {
        let mut registry = CaveatRegistry::default();
        assert!(registry.get(EXPIRATION_CAVEAT).is_some());
        assert!(registry.get("Unknown").is_none());

        fn deny(_: &Caveat, _: &CaveatContext<'_>) -> Result<(), String> {
            Err("always".to_string())
        }

        registry.register("Deny", deny);
        assert!(registry.get("Deny").is_some());
        assert!(CaveatRegistry::empty().get(EXPIRATION_CAVEAT).is_none());
    }
}
