//! # MyCash Contract
//!
//! The rules every cash transaction has to satisfy. See
//! [`MyCashContract`] for the full list.

pub mod command;
pub mod verification;

use thiserror::Error;

use crate::state::CurrencyCode;

pub use command::{CashCommand, CommandWithSigners};
pub use verification::{Contract, MyCashContract};

/// Why a transaction was refused. Deterministic: the same transaction fails
/// the same way every time, so these are never retried as-is.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("state governed by foreign contract {contract}")]
    ForeignState { contract: String },

    #[error("output {index} has a zero amount")]
    ZeroAmountOutput { index: usize },

    #[error("{command} must not consume inputs (found {count})")]
    InputsNotAllowed { command: CashCommand, count: usize },

    #[error("{command} must not create outputs (found {count})")]
    OutputsNotAllowed { command: CashCommand, count: usize },

    #[error("{command} requires at least one input")]
    NoInputs { command: CashCommand },

    #[error("{command} requires at least one output")]
    NoOutputs { command: CashCommand },

    #[error("issuer and owner must differ: {party} cannot issue to itself")]
    SelfIssue { party: String },

    #[error("missing {role} signature from {party}")]
    MissingSignature { role: &'static str, party: String },

    #[error("value not conserved for {currency} issued by {issuer}: inputs {inputs}, outputs {outputs}")]
    Unbalanced {
        issuer: String,
        currency: CurrencyCode,
        inputs: u128,
        outputs: u128,
    },
}
