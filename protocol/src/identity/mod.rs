//! # Identity Module
//!
//! Who is who on the ledger.
//!
//! 1. **Parties**: [`Party`] (well-known, named), [`AnonymousParty`]
//!    (confidential, key only) and [`AbstractParty`] (either).
//! 2. **Certificates**: a well-known key's signature over a confidential
//!    key, letting third parties resolve it.
//! 3. **Resolver**: [`IdentityResolver`] / [`IdentityService`], the lookup
//!    every verifier and selector goes through.
//! 4. **Keys**: [`KeyManagementService`], the only holder of secrets.
//! 5. **Per-flow cache**: [`ConfidentialIdentities`], so one transaction
//!    never generates two confidential identities for the same counterparty.

pub mod certificate;
pub mod confidential;
pub mod keys;
pub mod party;
pub mod service;

use thiserror::Error;

use crate::storage::DbError;

pub use certificate::IdentityCertificate;
pub use confidential::ConfidentialIdentities;
pub use keys::KeyManagementService;
pub use party::{AbstractParty, AnonymousParty, Party};
pub use service::{IdentityResolver, IdentityService};

/// Identity failures. [`IdentityError::UnknownIdentity`] is fatal for
/// whatever protocol step needed the answer.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("cannot resolve identity {identity} to a well-known party")]
    UnknownIdentity { identity: String },

    #[error("invalid identity certificate for key {key}")]
    InvalidCertificate { key: String },

    #[error("key {key} is already bound to a different party")]
    ConflictingCertificate { key: String },

    #[error("keypair does not belong to {party}")]
    KeyMismatch { party: String },

    #[error("no signing key held for {key}")]
    KeyNotHeld { key: String },

    #[error(transparent)]
    Storage(#[from] DbError),
}
