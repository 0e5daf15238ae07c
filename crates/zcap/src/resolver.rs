//! Capability lookup by identifier.

use crate::{BoxError, Capability, ResolveError};
use std::collections::HashMap;
use std::sync::Arc;

/// Fetches capabilities by URI.
///
/// Implementations return a fully validated capability or an error. The
/// verifier treats every error as fatal and never retries.
pub trait CapabilityResolver {
    fn resolve(&self, uri: &str) -> Result<Capability, BoxError>;
}

impl<T: CapabilityResolver + ?Sized> CapabilityResolver for &T {
    fn resolve(&self, uri: &str) -> Result<Capability, BoxError> {
        (**self).resolve(uri)
    }
}

impl<T: CapabilityResolver + ?Sized> CapabilityResolver for Arc<T> {
    fn resolve(&self, uri: &str) -> Result<Capability, BoxError> {
        (**self).resolve(uri)
    }
}

impl<T: CapabilityResolver + ?Sized> CapabilityResolver for Box<T> {
    fn resolve(&self, uri: &str) -> Result<Capability, BoxError> {
        (**self).resolve(uri)
    }
}

/// An in-memory set of trusted capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    capabilities: HashMap<String, Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, replacing any with the same id.
    pub fn insert(&mut self, capability: Capability) -> Result<(), ResolveError> {
        capability
            .validate_capability_chain()
            .map_err(|source| ResolveError::Malformed {
                id: capability.id.clone(),
                source,
            })?;
        self.capabilities.insert(capability.id.clone(), capability);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.capabilities.get(id)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl TryFrom<Vec<Capability>> for CapabilitySet {
    type Error = ResolveError;

    fn try_from(capabilities: Vec<Capability>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for capability in capabilities {
            set.insert(capability)?;
        }
        Ok(set)
    }
}

impl CapabilityResolver for CapabilitySet {
    fn resolve(&self, uri: &str) -> Result<Capability, BoxError> {
        self.capabilities
            .get(uri)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(uri.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainEntry;

    #[test]
    fn test_resolve_known_and_unknown() {
        let set = CapabilitySet::try_from(vec![Capability::root("urn:cap:1")]).unwrap();

        assert_eq!(set.resolve("urn:cap:1").unwrap().id, "urn:cap:1");
        let err = set.resolve("urn:cap:2").unwrap_err();
        assert_eq!(err.to_string(), "capability not found: urn:cap:2");
    }

    #[test]
    fn test_insert_rejects_malformed_chain() {
        let root = Capability::root("urn:cap:root");
        let bad = Capability::delegated(
            "urn:cap:child",
            &root,
            vec![ChainEntry::Embedded(Box::new(root.clone()))],
        );

        let mut set = CapabilitySet::new();
        assert!(matches!(
            set.insert(bad),
            Err(ResolveError::Malformed { .. })
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_resolve_through_arc() {
        let mut set = CapabilitySet::new();
        set.insert(Capability::root("urn:cap:1")).unwrap();
        let shared = Arc::new(set);

        assert!(shared.resolve("urn:cap:1").is_ok());
        assert!((&shared).resolve("urn:cap:1").is_ok());
    }
}
