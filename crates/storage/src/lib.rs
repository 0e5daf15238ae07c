//! SQLite-backed capability storage for the ZCAP verifier.
//!
//! The verifier only trusts root capabilities it can resolve independently.
//! This crate keeps those capabilities on disk and serves them through the
//! [`zcap::CapabilityResolver`] contract.
//!
//! # Overview
//!
//! Each row holds one capability document as JSON, indexed by its id, along
//! with its invocation target, expiry and import time for listing.
//!
//! # Example
//!
//! ```no_run
//! use storage::CapabilityStore;
//! use zcap::{Capability, CapabilityInvocation, Proof, VerificationMethod, Verifier};
//!
//! let store = CapabilityStore::open("capabilities.db")?;
//!
//! let root = Capability::root("urn:cap:1")
//!     .with_allowed_action("read")
//!     .with_invoker("did:ex:alice");
//! store.insert(&root)?;
//!
//! let verifier = Verifier::new(&store);
//! let invocation = CapabilityInvocation::new("read", VerificationMethod::new("did:ex:alice"));
//! verifier.verify(&Proof::new(root, "read"), &invocation)?;
//!
//! for summary in store.list()? {
//!     println!("{} -> {}", summary.id, summary.target);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{CapabilityStore, StoredCapability};
