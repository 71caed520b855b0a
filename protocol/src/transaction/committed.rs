//! Notarised transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signing::{SignedTransaction, TransactionSignature};
use super::TransactionError;
use crate::crypto::{SecureHash, SignatureError};

/// A fully signed proposal the gateway accepted. Immutable: nothing in the
/// crate hands out `&mut` to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    pub stx: SignedTransaction,
    /// The notary's signature over the transaction id.
    pub notary_signature: TransactionSignature,
    /// Commit position assigned by the gateway. Unique and increasing.
    pub sequence: u64,
    pub committed_at: DateTime<Utc>,
}

impl CommittedTransaction {
    pub fn id(&self) -> SecureHash {
        self.stx.id()
    }

    /// The notary signature is by the transaction's notary and is valid.
    pub fn verify_notarisation(&self) -> Result<(), TransactionError> {
        let notary = self.stx.tx.notary.owning_key();
        if self.notary_signature.by != notary {
            return Err(TransactionError::WrongNotary {
                expected: self.stx.tx.notary.name().to_string(),
            });
        }
        if !self.notary_signature.verify(&self.id()) {
            return Err(SignatureError::VerificationFailed {
                signer: notary.to_base58(),
            }
            .into());
        }
        Ok(())
    }

    /// Notarisation plus every required signature.
    pub fn verify(&self) -> Result<(), TransactionError> {
        self.verify_notarisation()?;
        self.stx.verify_required_signatures()
    }
}
