//! # Hashing Utilities
//!
//! SHA-256 is the only hash the ledger uses. Transaction ids are the
//! double SHA-256 of a transaction's canonical bytes, wrapped in
//! [`SecureHash`] so ids can't be confused with arbitrary byte strings.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::HASH_OUTPUT_LENGTH;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecureHash([u8; HASH_OUTPUT_LENGTH]);

impl SecureHash {
    pub const ZERO: SecureHash = SecureHash([0u8; HASH_OUTPUT_LENGTH]);

    pub fn from_bytes(bytes: [u8; HASH_OUTPUT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; HASH_OUTPUT_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({})", &self.to_hex()[..16])
    }
}

/// SHA-256 of `data`.
///
/// ```
/// use mycash_protocol::crypto::sha256;
///
/// assert_eq!(sha256(b"MyCash").as_bytes().len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> SecureHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; HASH_OUTPUT_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    SecureHash(out)
}

/// `SHA-256(SHA-256(data))`. Used for transaction ids.
pub fn double_sha256(data: &[u8]) -> SecureHash {
    let first = sha256(data);
    sha256(first.as_bytes())
}
