//! Addressing states on the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cash::MyCash;
use crate::crypto::SecureHash;
use crate::identity::Party;

/// Pointer to output `index` of transaction `tx_id`. Unique per record,
/// consumable exactly once.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateRef {
    pub tx_id: SecureHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(tx_id: SecureHash, index: u32) -> Self {
        Self { tx_id, index }
    }

    /// 36-byte storage key: tx id then big-endian index, so refs of the same
    /// transaction sort together and in output order.
    pub fn to_key(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(self.tx_id.as_bytes());
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }

    /// Inverse of [`to_key`](Self::to_key).
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != 36 {
            return None;
        }
        let mut tx_id = [0u8; 32];
        tx_id.copy_from_slice(&key[..32]);
        let index: [u8; 4] = key[32..].try_into().ok()?;
        Some(Self::new(SecureHash::from_bytes(tx_id), u32::from_be_bytes(index)))
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tx_id, self.index)
    }
}

impl fmt::Debug for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRef({}..:{})", &self.tx_id.to_hex()[..12], self.index)
    }
}

/// A cash record together with the notary that guards it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    pub data: MyCash,
    pub notary: Party,
}

/// A state and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: TransactionState,
    pub reference: StateRef,
}

impl StateAndRef {
    pub fn data(&self) -> &MyCash {
        &self.state.data
    }

    pub fn notary(&self) -> &Party {
        &self.state.notary
    }
}
