//! The transaction proposal.
//!
//! A [`WireTransaction`] names its inputs by reference only; the records
//! behind them live in whichever vault or dependency supplied them. Its id
//! is the double-SHA-256 of [`WireTransaction::signable_bytes`], which makes
//! it stable across signing: every signature is over the id.

use serde::{Deserialize, Serialize};

use crate::config::TRANSACTION_FORMAT_VERSION;
use crate::contract::CommandWithSigners;
use crate::crypto::{double_sha256, PublicKey, SecureHash};
use crate::identity::{AbstractParty, Party};
use crate::state::{MyCash, StateAndRef, StateRef, TransactionState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    pub inputs: Vec<StateRef>,
    pub outputs: Vec<MyCash>,
    pub command: CommandWithSigners,
    pub notary: Party,
}

impl WireTransaction {
    /// `double_sha256(signable_bytes)`.
    pub fn id(&self) -> SecureHash {
        double_sha256(&self.signable_bytes())
    }

    /// Canonical byte layout used for the id.
    ///
    /// Integers are little-endian, strings and collections are
    /// length-prefixed with a `u32`. Identities are a tag byte (0 for
    /// well-known, 1 for anonymous), the name for well-known parties, then
    /// the 32-byte key. Serde output is never hashed.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + 160 * self.outputs.len());

        buf.extend_from_slice(&TRANSACTION_FORMAT_VERSION.to_le_bytes());

        put_str(&mut buf, self.notary.name());
        buf.extend_from_slice(self.notary.owning_key().as_bytes());

        buf.push(self.command.value.tag());
        put_len(&mut buf, self.command.signers.len());
        for key in &self.command.signers {
            buf.extend_from_slice(key.as_bytes());
        }

        put_len(&mut buf, self.inputs.len());
        for input in &self.inputs {
            buf.extend_from_slice(&input.to_key());
        }

        put_len(&mut buf, self.outputs.len());
        for output in &self.outputs {
            put_party(&mut buf, output.issuer());
            put_party(&mut buf, output.owner());
            buf.extend_from_slice(&output.amount().to_le_bytes());
            put_str(&mut buf, output.currency().as_str());
        }

        buf
    }

    pub fn required_signers(&self) -> &std::collections::BTreeSet<PublicKey> {
        &self.command.signers
    }

    /// The outputs as they will sit in a vault once committed.
    pub fn output_states(&self) -> Vec<StateAndRef> {
        let id = self.id();
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, data)| StateAndRef {
                state: TransactionState {
                    data: data.clone(),
                    notary: self.notary.clone(),
                },
                reference: StateRef::new(id, index as u32),
            })
            .collect()
    }

    /// The output at `reference`, if `reference` points into this transaction.
    pub fn out_ref(&self, reference: &StateRef) -> Option<StateAndRef> {
        if reference.tx_id != self.id() {
            return None;
        }
        let data = self.outputs.get(reference.index as usize)?;
        Some(StateAndRef {
            state: TransactionState {
                data: data.clone(),
                notary: self.notary.clone(),
            },
            reference: *reference,
        })
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_len(buf, s.len());
    buf.extend_from_slice(s.as_bytes());
}

fn put_party(buf: &mut Vec<u8>, party: &AbstractParty) {
    match party {
        AbstractParty::WellKnown(p) => {
            buf.push(0);
            put_str(buf, p.name());
        }
        AbstractParty::Anonymous(_) => buf.push(1),
    }
    buf.extend_from_slice(party.owning_key().as_bytes());
}
