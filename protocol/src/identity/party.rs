//! Party identities.
//!
//! A [`Party`] is a well-known identity: a legal name bound to an owning key
//! on the network map. An [`AnonymousParty`] is just a key; only nodes that
//! hold its certificate can say who is behind it. Cash records store
//! [`AbstractParty`], which is either.
//!
//! Equality and hashing of all three go by owning key alone. The key is the
//! identity reference; the name is decoration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::crypto::PublicKey;

/// A well-known party.
#[derive(Clone, Serialize, Deserialize)]
pub struct Party {
    name: String,
    owning_key: PublicKey,
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owning_key(&self) -> PublicKey {
        self.owning_key
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.owning_key == other.owning_key
    }
}

impl Eq for Party {}

impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owning_key.hash(state);
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Party({})", self.name)
    }
}

/// A confidential identity. Single use by convention: a fresh one is
/// generated per counterparty per transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnonymousParty {
    owning_key: PublicKey,
}

impl AnonymousParty {
    pub fn new(owning_key: PublicKey) -> Self {
        Self { owning_key }
    }

    pub fn owning_key(&self) -> PublicKey {
        self.owning_key
    }
}

impl fmt::Display for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anonymous({})", self.owning_key.to_base58())
    }
}

impl fmt::Debug for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Either kind of identity, as stored in a cash record.
#[derive(Clone, Serialize, Deserialize)]
pub enum AbstractParty {
    WellKnown(Party),
    Anonymous(AnonymousParty),
}

impl AbstractParty {
    pub fn owning_key(&self) -> PublicKey {
        match self {
            Self::WellKnown(p) => p.owning_key(),
            Self::Anonymous(a) => a.owning_key(),
        }
    }

    /// The name, if this reference carries one. Anonymous parties don't.
    pub fn name_or_none(&self) -> Option<&str> {
        match self {
            Self::WellKnown(p) => Some(p.name()),
            Self::Anonymous(_) => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous(_))
    }

    pub fn as_well_known(&self) -> Option<&Party> {
        match self {
            Self::WellKnown(p) => Some(p),
            Self::Anonymous(_) => None,
        }
    }

    /// Strip the name, keeping only the key.
    pub fn to_anonymous(&self) -> AnonymousParty {
        AnonymousParty::new(self.owning_key())
    }
}

impl PartialEq for AbstractParty {
    fn eq(&self, other: &Self) -> bool {
        self.owning_key() == other.owning_key()
    }
}

impl Eq for AbstractParty {}

impl Hash for AbstractParty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owning_key().hash(state);
    }
}

impl From<Party> for AbstractParty {
    fn from(p: Party) -> Self {
        Self::WellKnown(p)
    }
}

impl From<&Party> for AbstractParty {
    fn from(p: &Party) -> Self {
        Self::WellKnown(p.clone())
    }
}

impl From<AnonymousParty> for AbstractParty {
    fn from(a: AnonymousParty) -> Self {
        Self::Anonymous(a)
    }
}

impl fmt::Display for AbstractParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WellKnown(p) => write!(f, "{}", p),
            Self::Anonymous(a) => write!(f, "{}", a),
        }
    }
}

impl fmt::Debug for AbstractParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WellKnown(p) => write!(f, "{:?}", p),
            Self::Anonymous(a) => write!(f, "{:?}", a),
        }
    }
}
