//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] collects inputs, outputs, the command and the
//! signer keys, then produces an unsigned [`WireTransaction`]. It does not
//! sign and does not verify contract rules; the only checks here are the
//! structural ones that make a proposal well-formed at all.

use std::collections::{BTreeSet, HashSet};

use super::ledger::LedgerTransaction;
use super::wire::WireTransaction;
use super::BuilderError;
use crate::contract::{CashCommand, CommandWithSigners};
use crate::crypto::PublicKey;
use crate::identity::Party;
use crate::state::{MyCash, StateAndRef};

/// Fluent builder for unsigned cash transactions.
///
/// ```rust,no_run
/// # use mycash_protocol::transaction::TransactionBuilder;
/// # use mycash_protocol::contract::CashCommand;
/// # fn demo(notary: mycash_protocol::identity::Party, out: mycash_protocol::state::MyCash)
/// #     -> Result<(), mycash_protocol::transaction::BuilderError> {
/// let signers = out.exit_keys();
/// let wtx = TransactionBuilder::new(notary)
///     .add_output(out)
///     .command(CashCommand::Issue)
///     .add_signers(signers)
///     .build()?;
/// # let _ = wtx; Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateAndRef>,
    outputs: Vec<MyCash>,
    command: Option<CashCommand>,
    signers: BTreeSet<PublicKey>,
}

impl TransactionBuilder {
    pub fn new(notary: Party) -> Self {
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            command: None,
            signers: BTreeSet::new(),
        }
    }

    pub fn add_input(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_inputs<I: IntoIterator<Item = StateAndRef>>(mut self, inputs: I) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn add_output(mut self, output: MyCash) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn add_outputs<I: IntoIterator<Item = MyCash>>(mut self, outputs: I) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn command(mut self, command: CashCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn add_signer(mut self, key: PublicKey) -> Self {
        self.signers.insert(key);
        self
    }

    pub fn add_signers<I: IntoIterator<Item = PublicKey>>(mut self, keys: I) -> Self {
        self.signers.extend(keys);
        self
    }

    pub fn notary(&self) -> &Party {
        &self.notary
    }

    /// Assemble the proposal.
    ///
    /// # Errors
    ///
    /// - [`BuilderError::MissingCommand`] when no command was set.
    /// - [`BuilderError::NotaryMismatch`] when an input is governed by a
    ///   notary other than the builder's.
    /// - [`BuilderError::DuplicateInput`] when a ref is added twice.
    pub fn build(self) -> Result<WireTransaction, BuilderError> {
        self.build_resolved().map(|(wtx, _)| wtx)
    }

    /// Like [`build`](Self::build), also returning the proposal resolved
    /// against the inputs the builder was given so the caller can verify it
    /// without another lookup.
    pub fn build_resolved(self) -> Result<(WireTransaction, LedgerTransaction), BuilderError> {
        let value = self.command.ok_or(BuilderError::MissingCommand)?;

        if let Some(stray) = self.inputs.iter().find(|i| i.notary() != &self.notary) {
            return Err(BuilderError::NotaryMismatch {
                expected: self.notary.name().to_string(),
                found: stray.notary().name().to_string(),
                reference: stray.reference,
            });
        }

        let mut seen = HashSet::with_capacity(self.inputs.len());
        if let Some(dup) = self.inputs.iter().find(|i| !seen.insert(i.reference)) {
            return Err(BuilderError::DuplicateInput {
                reference: dup.reference,
            });
        }

        let wtx = WireTransaction {
            inputs: self.inputs.iter().map(|i| i.reference).collect(),
            outputs: self.outputs,
            command: CommandWithSigners::new(value, self.signers),
            notary: self.notary,
        };
        let ltx = LedgerTransaction {
            id: wtx.id(),
            inputs: self.inputs,
            outputs: wtx.outputs.clone(),
            command: wtx.command.clone(),
            notary: wtx.notary.clone(),
        };
        Ok((wtx, ltx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sha256, PartyKeypair};
    use crate::state::{CurrencyCode, StateRef, TransactionState};

    fn party(name: &str) -> Party {
        Party::new(name, PartyKeypair::generate().public_key())
    }

    fn held(notary: &Party, n: u8) -> StateAndRef {
        let data = MyCash::new(
            party("Bank"),
            party("Alice"),
            10,
            CurrencyCode::new("USD").unwrap(),
        )
        .unwrap();
        StateAndRef {
            state: TransactionState {
                data,
                notary: notary.clone(),
            },
            reference: StateRef::new(sha256(&[n]), 0),
        }
    }

    #[test]
    fn build_without_command_fails() {
        let notary = party("Notary");
        match TransactionBuilder::new(notary).build() {
            Err(BuilderError::MissingCommand) => {}
            other => panic!("expected MissingCommand, got {:?}", other),
        }
    }

    #[test]
    fn inputs_from_another_notary_are_refused() {
        let notary = party("Notary");
        let other = party("OtherNotary");
        let result = TransactionBuilder::new(notary.clone())
            .add_input(held(&notary, 1))
            .add_input(held(&other, 2))
            .command(CashCommand::Move)
            .build();
        match result {
            Err(BuilderError::NotaryMismatch { found, .. }) => assert_eq!(found, "OtherNotary"),
            other => panic!("expected NotaryMismatch, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_inputs_are_refused() {
        let notary = party("Notary");
        let input = held(&notary, 1);
        let result = TransactionBuilder::new(notary)
            .add_input(input.clone())
            .add_input(input)
            .command(CashCommand::Move)
            .build();
        assert!(matches!(result, Err(BuilderError::DuplicateInput { .. })));
    }

    #[test]
    fn signers_are_distinct_and_order_insensitive() {
        let notary = party("Notary");
        let a = PartyKeypair::generate().public_key();
        let b = PartyKeypair::generate().public_key();

        let one = TransactionBuilder::new(notary.clone())
            .command(CashCommand::Exit)
            .add_signer(a)
            .add_signer(b)
            .add_signer(a)
            .build()
            .unwrap();
        let two = TransactionBuilder::new(notary)
            .command(CashCommand::Exit)
            .add_signers([b, a])
            .build()
            .unwrap();

        assert_eq!(one.command.signers.len(), 2);
        assert_eq!(one.id(), two.id());
    }

    #[test]
    fn resolved_view_matches_the_proposal() {
        let notary = party("Notary");
        let input = held(&notary, 1);
        let (wtx, ltx) = TransactionBuilder::new(notary)
            .add_input(input.clone())
            .add_output(input.data().clone())
            .command(CashCommand::Move)
            .build_resolved()
            .unwrap();
        assert_eq!(ltx.id, wtx.id());
        assert_eq!(wtx.inputs, vec![input.reference]);
        assert_eq!(ltx.inputs, vec![input]);
    }
}
