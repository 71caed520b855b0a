//! The MyCash record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::amount::{Amount, CurrencyCode};
use super::StateError;
use crate::config::MYCASH_CONTRACT_ID;
use crate::crypto::PublicKey;
use crate::identity::AbstractParty;

/// What the contract engine needs from any state it verifies.
pub trait ContractState {
    /// Parties whose vaults track this state.
    fn participants(&self) -> Vec<AbstractParty>;

    /// The contract that governs the state.
    fn contract_id(&self) -> &'static str;
}

/// One unspent unit of cash: `amount` minor units of `currency`, issued by
/// `issuer` and held by `owner`.
///
/// Immutable. Moving cash consumes the record and creates new ones;
/// [`MyCash::with_new_owner`] returns a fresh value and leaves `self` alone.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MyCash {
    issuer: AbstractParty,
    owner: AbstractParty,
    amount: u64,
    currency: CurrencyCode,
}

impl MyCash {
    /// Builds a record, refusing zero amounts.
    pub fn new(
        issuer: impl Into<AbstractParty>,
        owner: impl Into<AbstractParty>,
        amount: u64,
        currency: CurrencyCode,
    ) -> Result<Self, StateError> {
        if amount == 0 {
            return Err(StateError::NonPositiveAmount);
        }
        Ok(Self {
            issuer: issuer.into(),
            owner: owner.into(),
            amount,
            currency,
        })
    }

    pub fn issuer(&self) -> &AbstractParty {
        &self.issuer
    }

    pub fn owner(&self) -> &AbstractParty {
        &self.owner
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn to_amount(&self) -> Amount {
        Amount::new(self.amount, self.currency.clone())
    }

    /// Keys whose signatures retire this record: issuer and owner both.
    pub fn exit_keys(&self) -> BTreeSet<PublicKey> {
        [self.issuer.owning_key(), self.owner.owning_key()]
            .into_iter()
            .collect()
    }

    /// Same cash, different holder.
    pub fn with_new_owner(&self, owner: impl Into<AbstractParty>) -> Self {
        Self {
            issuer: self.issuer.clone(),
            owner: owner.into(),
            amount: self.amount,
            currency: self.currency.clone(),
        }
    }

    /// Same holder and token, different quantity.
    pub fn with_amount(&self, amount: u64) -> Result<Self, StateError> {
        Self::new(
            self.issuer.clone(),
            self.owner.clone(),
            amount,
            self.currency.clone(),
        )
    }

    /// Same quantity with issuer and owner replaced. Used when swapping
    /// well-known identities for confidential ones.
    pub fn with_parties(
        &self,
        issuer: impl Into<AbstractParty>,
        owner: impl Into<AbstractParty>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            owner: owner.into(),
            amount: self.amount,
            currency: self.currency.clone(),
        }
    }
}

impl ContractState for MyCash {
    fn participants(&self) -> Vec<AbstractParty> {
        vec![self.owner.clone()]
    }

    fn contract_id(&self) -> &'static str {
        MYCASH_CONTRACT_ID
    }
}

impl fmt::Display for MyCash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} issued by {} owned by {}",
            self.to_amount().display_decimal(),
            self.issuer,
            self.owner
        )
    }
}

impl fmt::Debug for MyCash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MyCash({} {}, issuer={:?}, owner={:?})",
            self.amount, self.currency, self.issuer, self.owner
        )
    }
}
