//! # Ledger State
//!
//! The cash record ([`MyCash`]), how records are addressed ([`StateRef`],
//! [`StateAndRef`]) and the projection the vault indexes
//! ([`PersistentMyCash`]).

pub mod amount;
pub mod cash;
pub mod reference;
pub mod schema;

use thiserror::Error;

pub use amount::{Amount, CurrencyCode};
pub use cash::{ContractState, MyCash};
pub use reference::{StateAndRef, StateRef, TransactionState};
pub use schema::{MappedSchema, PersistentMyCash, QueryableState, MYCASH_SCHEMA_V1};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cash amount must be greater than zero")]
    NonPositiveAmount,

    #[error("invalid currency code {code:?}: expected three uppercase letters")]
    InvalidCurrencyCode { code: String },
}
