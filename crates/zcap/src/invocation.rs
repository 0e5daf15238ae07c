//! Invocation requests and the proofs that accompany them.

use crate::Capability;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A key or identity used to sign an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,

    /// Entity controlling this method. Empty when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub controller: String,
}

impl VerificationMethod {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controller: String::new(),
        }
    }

    pub fn with_controller(id: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controller: controller.into(),
        }
    }
}

/// What the caller expects an invocation to be doing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInvocation {
    pub expected_action: String,

    /// Checked against the root capability's target when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_target: Option<String>,

    /// Checked against the root capability's id when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_root_capability: Option<String>,

    pub verification_method: VerificationMethod,
}

impl CapabilityInvocation {
    pub fn new(expected_action: impl Into<String>, verification_method: VerificationMethod) -> Self {
        Self {
            expected_action: expected_action.into(),
            expected_target: None,
            expected_root_capability: None,
            verification_method,
        }
    }

    pub fn with_expected_target(mut self, target: impl Into<String>) -> Self {
        self.expected_target = Some(target.into());
        self
    }

    pub fn with_expected_root(mut self, root: impl Into<String>) -> Self {
        self.expected_root_capability = Some(root.into());
        self
    }
}

/// The capability, action and signer extracted from an invocation proof.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(default)]
    pub capability: Option<Capability>,

    #[serde(default)]
    pub capability_action: String,

    #[serde(default)]
    pub verification_method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Proof {
    pub fn new(capability: Capability, capability_action: impl Into<String>) -> Self {
        Self {
            capability: Some(capability),
            capability_action: capability_action.into(),
            verification_method: String::new(),
            created: None,
        }
    }

    pub fn with_verification_method(mut self, method: impl Into<String>) -> Self {
        self.verification_method = method.into();
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}
