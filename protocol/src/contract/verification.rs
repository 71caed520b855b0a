//! Contract verification.
//!
//! [`MyCashContract::verify`] is a pure function of the resolved transaction
//! and the identity resolver. It touches no storage and has no side
//! effects, so initiators and every counterparty can run it independently
//! and must reach the same answer.

use std::collections::BTreeMap;

use super::command::CashCommand;
use super::ContractError;
use crate::config::MYCASH_CONTRACT_ID;
use crate::crypto::PublicKey;
use crate::identity::IdentityResolver;
use crate::state::{ContractState, CurrencyCode};
use crate::transaction::LedgerTransaction;

/// A pluggable verification engine.
pub trait Contract: Send + Sync {
    fn verify(
        &self,
        tx: &LedgerTransaction,
        identities: &dyn IdentityResolver,
    ) -> Result<(), ContractError>;
}

/// Rules for MyCash.
#[derive(Debug, Clone, Copy, Default)]
pub struct MyCashContract;

impl Contract for MyCashContract {
    /// Checks, in order:
    ///
    /// 1. Every state belongs to this contract.
    /// 2. Every output carries a positive amount.
    /// 3. The command's rule set:
    ///    - **Issue**: no inputs, some outputs, issuer and owner differ, and
    ///      every issuer and owner signs.
    ///    - **Move**: some inputs, some outputs, value conserved per
    ///      (issuer, currency), and every input owner signs.
    ///    - **Exit**: some inputs, no outputs, and every exit key signs.
    fn verify(
        &self,
        tx: &LedgerTransaction,
        identities: &dyn IdentityResolver,
    ) -> Result<(), ContractError> {
        // 1. Contract ownership.
        let foreign = tx
            .inputs
            .iter()
            .map(|i| i.data().contract_id())
            .chain(tx.outputs.iter().map(|o| o.contract_id()))
            .find(|id| *id != MYCASH_CONTRACT_ID);
        if let Some(id) = foreign {
            return Err(ContractError::ForeignState {
                contract: id.to_string(),
            });
        }

        // 2. Positive amounts. Construction already guarantees this for
        //    states we built; received states are checked again.
        if let Some(index) = tx.outputs.iter().position(|o| o.amount() == 0) {
            return Err(ContractError::ZeroAmountOutput { index });
        }

        // 3. Command rules.
        match tx.command.value {
            CashCommand::Issue => verify_issue(tx, identities),
            CashCommand::Move => verify_move(tx, identities),
            CashCommand::Exit => verify_exit(tx),
        }
    }
}

fn verify_issue(
    tx: &LedgerTransaction,
    identities: &dyn IdentityResolver,
) -> Result<(), ContractError> {
    if !tx.inputs.is_empty() {
        return Err(ContractError::InputsNotAllowed {
            command: CashCommand::Issue,
            count: tx.inputs.len(),
        });
    }
    if tx.outputs.is_empty() {
        return Err(ContractError::NoOutputs {
            command: CashCommand::Issue,
        });
    }
    for output in &tx.outputs {
        if identities.is_same_party(output.issuer(), output.owner()) {
            return Err(ContractError::SelfIssue {
                party: output.owner().to_string(),
            });
        }
        if !tx.command.requires(&output.issuer().owning_key()) {
            return Err(ContractError::MissingSignature {
                role: "issuer",
                party: output.issuer().to_string(),
            });
        }
        if !tx.command.requires(&output.owner().owning_key()) {
            return Err(ContractError::MissingSignature {
                role: "owner",
                party: output.owner().to_string(),
            });
        }
    }
    Ok(())
}

/// Running totals for one fungibility partition.
#[derive(Default)]
struct Partition {
    label: String,
    inputs: u128,
    outputs: u128,
}

fn verify_move(
    tx: &LedgerTransaction,
    identities: &dyn IdentityResolver,
) -> Result<(), ContractError> {
    if tx.inputs.is_empty() {
        return Err(ContractError::NoInputs {
            command: CashCommand::Move,
        });
    }
    if tx.outputs.is_empty() {
        return Err(ContractError::NoOutputs {
            command: CashCommand::Move,
        });
    }

    // Partition by (resolved issuer, currency). Cash from different issuers
    // is not fungible, so each partition must balance on its own; a
    // partition missing from one side sums to zero there.
    let mut partitions: BTreeMap<(PublicKey, CurrencyCode), Partition> = BTreeMap::new();
    for input in &tx.inputs {
        let cash = input.data();
        let issuer = identities.canonical(cash.issuer());
        let entry = partitions
            .entry((issuer.owning_key(), cash.currency().clone()))
            .or_insert_with(|| Partition {
                label: issuer.to_string(),
                ..Partition::default()
            });
        entry.inputs += u128::from(cash.amount());
    }
    for cash in &tx.outputs {
        let issuer = identities.canonical(cash.issuer());
        let entry = partitions
            .entry((issuer.owning_key(), cash.currency().clone()))
            .or_insert_with(|| Partition {
                label: issuer.to_string(),
                ..Partition::default()
            });
        entry.outputs += u128::from(cash.amount());
    }
    for ((_, currency), partition) in &partitions {
        if partition.inputs != partition.outputs {
            return Err(ContractError::Unbalanced {
                issuer: partition.label.clone(),
                currency: currency.clone(),
                inputs: partition.inputs,
                outputs: partition.outputs,
            });
        }
    }

    // Prior owners authorize the spend.
    for input in &tx.inputs {
        let owner = input.data().owner();
        if !tx.command.requires(&owner.owning_key()) {
            return Err(ContractError::MissingSignature {
                role: "input owner",
                party: owner.to_string(),
            });
        }
    }
    Ok(())
}

fn verify_exit(tx: &LedgerTransaction) -> Result<(), ContractError> {
    if tx.inputs.is_empty() {
        return Err(ContractError::NoInputs {
            command: CashCommand::Exit,
        });
    }
    if !tx.outputs.is_empty() {
        return Err(ContractError::OutputsNotAllowed {
            command: CashCommand::Exit,
            count: tx.outputs.len(),
        });
    }
    for input in &tx.inputs {
        if let Some(key) = input
            .data()
            .exit_keys()
            .into_iter()
            .find(|k| !tx.command.requires(k))
        {
            return Err(ContractError::MissingSignature {
                role: "exit key",
                party: key.to_base58(),
            });
        }
    }
    Ok(())
}
