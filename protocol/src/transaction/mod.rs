//! # Transaction Module
//!
//! Building, resolving, signing and notarising cash transactions.
//!
//! ## Architecture
//!
//! ```text
//! wire.rs      — WireTransaction, the proposal, and its canonical id
//! builder.rs   — fluent TransactionBuilder
//! ledger.rs    — LedgerTransaction, the proposal with inputs resolved
//! signing.rs   — TransactionSignature and SignedTransaction
//! committed.rs — CommittedTransaction, as returned by the gateway
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build**: assemble with [`TransactionBuilder`].
//! 2. **Verify**: resolve to a [`LedgerTransaction`] and run the contract.
//! 3. **Sign**: each required signer adds a [`TransactionSignature`] over
//!    the id.
//! 4. **Commit**: the gateway returns a [`CommittedTransaction`].
//!
//! Ids are `double_sha256` of the canonical byte layout, so they do not
//! move when signatures are added.

pub mod builder;
pub mod committed;
pub mod ledger;
pub mod signing;
pub mod wire;

use thiserror::Error;

use crate::crypto::SignatureError;
use crate::state::StateRef;

pub use builder::TransactionBuilder;
pub use committed::CommittedTransaction;
pub use ledger::LedgerTransaction;
pub use signing::{SignedTransaction, TransactionSignature};
pub use wire::WireTransaction;

/// Structural problems found while assembling a proposal.
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("transaction has no command")]
    MissingCommand,

    #[error("input {reference} is governed by notary {found}, transaction uses {expected}")]
    NotaryMismatch {
        expected: String,
        found: String,
        reference: StateRef,
    },

    #[error("input {reference} added twice")]
    DuplicateInput { reference: StateRef },
}

/// A proposal's input refs do not line up with the states offered for them.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("expected {expected} input states, got {found}")]
    InputCountMismatch { expected: usize, found: usize },

    #[error("input {index} should be {expected}, got {found}")]
    RefMismatch {
        index: usize,
        expected: StateRef,
        found: StateRef,
    },

    #[error("input {reference} is governed by a different notary")]
    NotaryMismatch { reference: StateRef },

    #[error("input {reference} could not be resolved")]
    MissingInput { reference: StateRef },
}

/// Signature-level checks on signed and committed transactions.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("missing signatures from {missing:?}")]
    MissingSignatures { missing: Vec<String> },

    #[error("signature by {signer}, who is not a required signer")]
    UnexpectedSigner { signer: String },

    #[error("not notarised by {expected}")]
    WrongNotary { expected: String },
}
