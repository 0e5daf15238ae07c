//! Verifier options loaded from TOML.

use crate::{Error, ProofCreatedValidator, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable verification policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierOptions {
    /// Maximum distance between the invocation proof's `created` time and now.
    /// Unset disables the check.
    #[serde(default)]
    pub max_proof_age_secs: Option<u64>,

    /// Reject invocation proofs without a `created` time.
    #[serde(default)]
    pub require_proof_created: bool,

    /// Skip caveats whose type has no registered evaluator instead of failing.
    #[serde(default)]
    pub ignore_unknown_caveats: bool,
}

impl VerifierOptions {
    /// Load options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse options from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let options: Self = toml::from_str(toml).map_err(|e| Error::Options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.require_proof_created && self.max_proof_age_secs.is_none() {
            return Err(Error::Options(
                "require_proof_created needs max_proof_age_secs".to_string(),
            ));
        }
        if let Some(secs) = self.max_proof_age_secs {
            if max_age(secs).is_none() {
                return Err(Error::Options(format!(
                    "max_proof_age_secs out of range: {secs}"
                )));
            }
        }
        Ok(())
    }

    /// The proof-created check these options ask for, if any.
    pub fn created_validator(&self) -> Option<ProofCreatedValidator> {
        let validator = ProofCreatedValidator::new(max_age(self.max_proof_age_secs?)?);
        Some(if self.require_proof_created {
            validator.required()
        } else {
            validator
        })
    }
}

fn max_age(secs: u64) -> Option<Duration> {
    Duration::try_seconds(i64::try_from(secs).ok()?)
}
