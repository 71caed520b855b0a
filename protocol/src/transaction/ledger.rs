//! Proposals resolved against their input states.

use super::wire::WireTransaction;
use super::ResolutionError;
use crate::contract::CommandWithSigners;
use crate::crypto::SecureHash;
use crate::identity::Party;
use crate::state::{MyCash, StateAndRef, StateRef};

/// What the contract verifier sees: the proposal with every input ref
/// replaced by the record it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: SecureHash,
    pub inputs: Vec<StateAndRef>,
    pub outputs: Vec<MyCash>,
    pub command: CommandWithSigners,
    pub notary: Party,
}

impl LedgerTransaction {
    /// Resolve `wtx` with `inputs` given in the same order as `wtx.inputs`.
    pub fn resolve(
        wtx: &WireTransaction,
        inputs: Vec<StateAndRef>,
    ) -> Result<Self, ResolutionError> {
        if inputs.len() != wtx.inputs.len() {
            return Err(ResolutionError::InputCountMismatch {
                expected: wtx.inputs.len(),
                found: inputs.len(),
            });
        }
        for (index, (want, got)) in wtx.inputs.iter().zip(&inputs).enumerate() {
            if *want != got.reference {
                return Err(ResolutionError::RefMismatch {
                    index,
                    expected: *want,
                    found: got.reference,
                });
            }
            if got.notary() != &wtx.notary {
                return Err(ResolutionError::NotaryMismatch { reference: *want });
            }
        }
        Ok(Self {
            id: wtx.id(),
            inputs,
            outputs: wtx.outputs.clone(),
            command: wtx.command.clone(),
            notary: wtx.notary.clone(),
        })
    }

    /// Resolve each input through `lookup`.
    pub fn resolve_with<F>(wtx: &WireTransaction, mut lookup: F) -> Result<Self, ResolutionError>
    where
        F: FnMut(&StateRef) -> Option<StateAndRef>,
    {
        let inputs = wtx
            .inputs
            .iter()
            .map(|r| lookup(r).ok_or(ResolutionError::MissingInput { reference: *r }))
            .collect::<Result<Vec<_>, _>>()?;
        Self::resolve(wtx, inputs)
    }
}
