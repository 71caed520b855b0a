//! Coin selection.
//!
//! First-fit over the owner's unconsumed records in vault order: take
//! records until the running sum reaches the target, then stop. No attempt
//! is made to minimise change or the number of inputs. Nothing is reserved
//! either, so two concurrent selections can pick the same record; the
//! gateway decides which one wins and the loser retries with the consumed
//! refs excluded.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use super::store::{CashQuery, Vault};
use crate::identity::{AbstractParty, IdentityResolver};
use crate::state::{Amount, CurrencyCode, MyCash, StateAndRef, StateError, StateRef};
use crate::storage::DbError;

/// Withdraw `amount` of `issuer`'s cash from `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub owner: AbstractParty,
    pub issuer: AbstractParty,
    pub amount: Amount,
}

impl MoveRequest {
    pub fn new(
        owner: impl Into<AbstractParty>,
        issuer: impl Into<AbstractParty>,
        quantity: u64,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            owner: owner.into(),
            issuer: issuer.into(),
            amount: Amount::new(quantity, currency),
        }
    }

    fn same_bucket(&self, other: &MoveRequest) -> bool {
        self.owner == other.owner
            && self.issuer == other.issuer
            && self.amount.currency == other.amount.currency
    }
}

/// Records chosen for one request, plus change back to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<StateAndRef>,
    pub total: u64,
    pub change: Option<MyCash>,
}

impl Selection {
    pub fn refs(&self) -> Vec<StateRef> {
        self.inputs.iter().map(|i| i.reference).collect()
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("insufficient funds: requested {requested} {currency}, available {available}, short by {shortfall}")]
    InsufficientFunds {
        currency: CurrencyCode,
        requested: u64,
        available: u64,
        shortfall: u64,
    },

    #[error("requested amount must be greater than zero")]
    ZeroAmount,

    #[error("amount overflow while consolidating {currency} requests")]
    Overflow { currency: CurrencyCode },

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Sum requests sharing (owner, issuer, currency) into one, keeping the
/// order in which each bucket first appeared.
pub fn consolidate(requests: &[MoveRequest]) -> Result<Vec<MoveRequest>, SelectionError> {
    let mut merged: Vec<MoveRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        match merged.iter_mut().find(|m| m.same_bucket(request)) {
            Some(existing) => {
                existing.amount.quantity = existing
                    .amount
                    .quantity
                    .checked_add(request.amount.quantity)
                    .ok_or_else(|| SelectionError::Overflow {
                        currency: request.amount.currency.clone(),
                    })?;
            }
            None => merged.push(request.clone()),
        }
    }
    Ok(merged)
}

/// Runs selection against one vault.
pub struct CashSelector<'a> {
    vault: &'a Vault,
    identities: &'a dyn IdentityResolver,
}

impl<'a> CashSelector<'a> {
    pub fn new(vault: &'a Vault, identities: &'a dyn IdentityResolver) -> Self {
        Self { vault, identities }
    }

    /// Select for one request, skipping anything in `exclude`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::InsufficientFunds`] when the owner's matching
    /// records, minus `exclude`, sum to less than the target.
    pub fn select(
        &self,
        request: &MoveRequest,
        exclude: &HashSet<StateRef>,
    ) -> Result<Selection, SelectionError> {
        let target = request.amount.quantity;
        if target == 0 {
            return Err(SelectionError::ZeroAmount);
        }

        let query = CashQuery {
            owner: Some(request.owner.clone()),
            issuer: Some(request.issuer.clone()),
            currency: Some(request.amount.currency.clone()),
        };
        let candidates = self.vault.query_unspent_resolved(&query, self.identities)?;

        let mut inputs = Vec::new();
        let mut sum: u128 = 0;
        for candidate in candidates {
            if sum >= u128::from(target) {
                break;
            }
            if exclude.contains(&candidate.reference) {
                continue;
            }
            sum += u128::from(candidate.data().amount());
            inputs.push(candidate);
        }

        if sum < u128::from(target) {
            // `sum < target`, so it fits.
            let available = sum as u64;
            return Err(SelectionError::InsufficientFunds {
                currency: request.amount.currency.clone(),
                requested: target,
                available,
                shortfall: target - available,
            });
        }

        let change_amount =
            u64::try_from(sum - u128::from(target)).map_err(|_| SelectionError::Overflow {
                currency: request.amount.currency.clone(),
            })?;
        let total = u64::try_from(sum).map_err(|_| SelectionError::Overflow {
            currency: request.amount.currency.clone(),
        })?;
        let change = if change_amount > 0 {
            Some(MyCash::new(
                request.issuer.clone(),
                request.owner.clone(),
                change_amount,
                request.amount.currency.clone(),
            )?)
        } else {
            None
        };

        debug!(
            owner = %request.owner,
            currency = %request.amount.currency,
            target,
            inputs = inputs.len(),
            change = change_amount,
            "selected cash"
        );
        Ok(Selection {
            inputs,
            total,
            change,
        })
    }

    /// Consolidate, then select for each bucket. Records picked for an
    /// earlier bucket are never offered to a later one.
    pub fn select_all(
        &self,
        requests: &[MoveRequest],
        exclude: &HashSet<StateRef>,
    ) -> Result<Vec<(MoveRequest, Selection)>, SelectionError> {
        let mut taken = exclude.clone();
        let mut out = Vec::new();
        for request in consolidate(requests)? {
            let selection = self.select(&request, &taken)?;
            taken.extend(selection.refs());
            out.push((request, selection));
        }
        Ok(out)
    }
}
