//! Capability documents and their delegation chains.

use crate::DocumentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Proof purpose marking a delegation proof.
pub const CAPABILITY_DELEGATION: &str = "capabilityDelegation";

/// A grant of authority over an invocation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    pub id: String,

    #[serde(default)]
    pub invocation_target: InvocationTarget,

    #[serde(
        default,
        deserialize_with = "optional_one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub controller: Option<Vec<String>>,

    /// Principals allowed to invoke. Takes precedence over `controller`.
    #[serde(
        default,
        deserialize_with = "optional_one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub invoker: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_capability: Option<String>,

    /// Empty means any action is allowed.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_action: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<Caveat>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub proof: Vec<DelegationProof>,
}

/// The resource a capability grants authority over.
///
/// Accepts either a bare URI or an `{ "id", "type" }` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationTarget {
    pub id: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl InvocationTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: String::new(),
        }
    }
}

impl<'de> Deserialize<'de> for InvocationTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Uri(String),
            Object {
                id: String,
                #[serde(rename = "type", default)]
                kind: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Uri(id) => Self::new(id),
            Repr::Object { id, kind } => Self { id, kind },
        })
    }
}

/// A proof attached to a capability document.
///
/// Signatures are checked upstream; only the delegation metadata is read here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationProof {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default)]
    pub proof_purpose: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_chain: Vec<ChainEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verification_method: String,
}

/// One entry of a `capabilityChain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    /// A capability identified by URI.
    Reference(String),
    /// A full capability document, allowed only as the last entry.
    Embedded(Box<Capability>),
}

impl ChainEntry {
    /// Identifier of the referenced or embedded capability.
    pub fn id(&self) -> &str {
        match self {
            ChainEntry::Reference(uri) => uri,
            ChainEntry::Embedded(capability) => &capability.id,
        }
    }
}

/// A restriction on when a capability may be invoked.
///
/// Parameters other than `type` are kept verbatim for the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Caveat {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl Capability {
    /// A root capability whose invocation target is itself.
    pub fn root(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            context: None,
            invocation_target: InvocationTarget::new(id.clone()),
            id,
            controller: None,
            invoker: None,
            parent_capability: None,
            allowed_action: Vec::new(),
            expires: None,
            caveats: Vec::new(),
            proof: Vec::new(),
        }
    }

    /// A capability delegated from `parent`, with the given chain.
    pub fn delegated(
        id: impl Into<String>,
        parent: &Capability,
        capability_chain: Vec<ChainEntry>,
    ) -> Self {
        Self {
            invocation_target: parent.invocation_target.clone(),
            parent_capability: Some(parent.id.clone()),
            proof: vec![DelegationProof {
                proof_purpose: CAPABILITY_DELEGATION.to_string(),
                capability_chain,
                ..Default::default()
            }],
            ..Self::root(id)
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.invocation_target = InvocationTarget::new(target);
        self
    }

    pub fn with_allowed_action(mut self, action: impl Into<String>) -> Self {
        self.allowed_action.push(action.into());
        self
    }

    pub fn with_invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker.get_or_insert_with(Vec::new).push(invoker.into());
        self
    }

    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller
            .get_or_insert_with(Vec::new)
            .push(controller.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_caveat(mut self, caveat: Caveat) -> Self {
        self.caveats.push(caveat);
        self
    }

    /// Whether this capability is a root (has no delegation chain).
    pub fn is_root(&self) -> bool {
        self.capability_chain()
            .map(|chain| chain.is_empty())
            .unwrap_or(false)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    fn delegation_proof(&self) -> Result<Option<&DelegationProof>, DocumentError> {
        let mut proofs = self
            .proof
            .iter()
            .filter(|p| p.proof_purpose == CAPABILITY_DELEGATION);
        let first = proofs.next();
        let extra = proofs.count();
        if extra > 0 {
            return Err(DocumentError::AmbiguousDelegationProof(extra + 1));
        }
        Ok(first)
    }

    /// Ordered delegation chain, empty for a root capability.
    pub fn capability_chain(&self) -> Result<&[ChainEntry], DocumentError> {
        Ok(self
            .delegation_proof()?
            .map(|proof| proof.capability_chain.as_slice())
            .unwrap_or_default())
    }

    /// Check that the delegation chain has an unambiguous shape.
    pub fn validate_capability_chain(&self) -> Result<(), DocumentError> {
        let chain = self.capability_chain()?;

        let Some(last) = chain.last() else {
            return match &self.parent_capability {
                Some(parent) => Err(DocumentError::MissingChain(parent.clone())),
                None => Ok(()),
            };
        };

        if !matches!(chain[0], ChainEntry::Reference(_)) {
            return Err(DocumentError::RootNotReference);
        }

        for (index, entry) in chain.iter().enumerate() {
            if entry.id().is_empty() {
                return Err(DocumentError::EmptyIdentifier {
                    field: "capabilityChain",
                });
            }
            if entry.id() == self.id {
                return Err(DocumentError::SelfReference(self.id.clone()));
            }
            if matches!(entry, ChainEntry::Embedded(_)) && index + 1 != chain.len() {
                return Err(DocumentError::EmbeddedBeforeLast { index });
            }
        }

        if let Some(parent) = &self.parent_capability {
            if last.id() != parent {
                return Err(DocumentError::ParentMismatch {
                    expected: parent.clone(),
                    actual: last.id().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Principals authorized to invoke this capability.
    ///
    /// `invoker` wins over `controller`; with neither the list is empty.
    pub fn invokers(&self) -> Result<Vec<&str>, DocumentError> {
        let (field, ids) = match (&self.invoker, &self.controller) {
            (Some(invoker), _) => ("invoker", invoker),
            (None, Some(controller)) => ("controller", controller),
            (None, None) => return Ok(Vec::new()),
        };

        if ids.iter().any(|id| id.is_empty()) {
            return Err(DocumentError::EmptyIdentifier { field });
        }

        Ok(ids.iter().map(String::as_str).collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::deserialize(deserializer).map(Vec::from)
}

fn optional_one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    one_or_many(deserializer).map(Some)
}
