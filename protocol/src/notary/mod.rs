//! # Notary
//!
//! The finalization gateway: the single point of total order, and the only
//! place a double spend is authoritatively detected.
//!
//! [`FinalizationGateway`] is the seam flows talk to; [`SimpleNotary`] is a
//! non-validating implementation. It checks signatures and uniqueness of
//! inputs, never contract rules, so it never needs to see input states.

pub mod simple;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::{IdentityError, Party};
use crate::state::StateRef;
use crate::storage::DbError;
use crate::transaction::{CommittedTransaction, SignedTransaction};

pub use simple::SimpleNotary;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Some inputs were already spent by a transaction committed earlier.
    /// The one error worth retrying, after fresh coin selection.
    #[error("inputs already consumed: {consumed:?}")]
    Conflict { consumed: Vec<StateRef> },

    #[error("transaction names notary {found}, this is {expected}")]
    WrongNotary { expected: String, found: String },

    #[error("signature check failed: {reason}")]
    InvalidSignatures { reason: String },

    #[error("input {reference} appears twice")]
    DuplicateInput { reference: StateRef },

    #[error("notary unavailable: {reason}")]
    Unavailable { reason: String },

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    Signing(#[from] IdentityError),
}

/// Orders and finalizes fully signed transactions.
#[async_trait]
pub trait FinalizationGateway: Send + Sync {
    fn identity(&self) -> &Party;

    /// Commit `stx`, or explain why not. On success every input is consumed
    /// and the returned transaction carries the notary's signature.
    async fn submit(&self, stx: SignedTransaction) -> Result<CommittedTransaction, GatewayError>;

    async fn is_consumed(&self, reference: &StateRef) -> Result<bool, GatewayError>;
}
