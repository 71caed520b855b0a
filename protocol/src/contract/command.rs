//! Cash commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::crypto::PublicKey;

/// What a transaction does to cash. Closed: the verifier matches on it
/// exhaustively and there is no "unknown command" at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashCommand {
    /// Create cash out of nothing, on the issuer's authority.
    Issue,
    /// Re-assign existing cash, conserving value per issuer and currency.
    Move,
    /// Retire cash from the ledger (off-ledger redemption).
    Exit,
}

impl CashCommand {
    /// Stable tag byte used in transaction ids.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Issue => 0,
            Self::Move => 1,
            Self::Exit => 2,
        }
    }
}

impl fmt::Display for CashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "Issue"),
            Self::Move => write!(f, "Move"),
            Self::Exit => write!(f, "Exit"),
        }
    }
}

/// A command and the keys that must sign for it. `BTreeSet` keeps the
/// signers distinct and in a fixed order, which the transaction id relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandWithSigners {
    pub value: CashCommand,
    pub signers: BTreeSet<PublicKey>,
}

impl CommandWithSigners {
    pub fn new<I>(value: CashCommand, signers: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        Self {
            value,
            signers: signers.into_iter().collect(),
        }
    }

    pub fn requires(&self, key: &PublicKey) -> bool {
        self.signers.contains(key)
    }
}
