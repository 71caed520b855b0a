//! Signed proposals.
//!
//! Every signature is over the transaction id bytes, so signatures can be
//! gathered in any order and attached to copies of the same proposal held
//! by different parties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::wire::WireTransaction;
use super::TransactionError;
use crate::crypto::{PublicKey, SecureHash, Signature, SignatureError};
use crate::identity::{IdentityError, KeyManagementService};

/// One party's signature over a transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: PublicKey,
    pub signature: Signature,
}

impl TransactionSignature {
    pub fn new(by: PublicKey, signature: Signature) -> Self {
        Self { by, signature }
    }

    /// Sign `id` with `key`, which the key management service must hold.
    pub fn create(
        keys: &KeyManagementService,
        key: &PublicKey,
        id: &SecureHash,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            by: *key,
            signature: keys.sign(key, id.as_bytes())?,
        })
    }

    pub fn verify(&self, id: &SecureHash) -> bool {
        self.by.verify(id.as_bytes(), &self.signature)
    }
}

/// A proposal plus whatever signatures have been gathered so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub sigs: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction) -> Self {
        Self {
            tx,
            sigs: Vec::new(),
        }
    }

    pub fn id(&self) -> SecureHash {
        self.tx.id()
    }

    /// Attach `sig` unless the same key already signed.
    pub fn with_signature(mut self, sig: TransactionSignature) -> Self {
        self.add_signature(sig);
        self
    }

    pub fn add_signature(&mut self, sig: TransactionSignature) {
        if !self.sigs.iter().any(|s| s.by == sig.by) {
            self.sigs.push(sig);
        }
    }

    pub fn add_signatures<I: IntoIterator<Item = TransactionSignature>>(&mut self, sigs: I) {
        for sig in sigs {
            self.add_signature(sig);
        }
    }

    pub fn signed_keys(&self) -> BTreeSet<PublicKey> {
        self.sigs.iter().map(|s| s.by).collect()
    }

    /// Required signers that have not signed yet.
    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        let signed = self.signed_keys();
        self.tx
            .required_signers()
            .iter()
            .filter(|k| !signed.contains(k))
            .copied()
            .collect()
    }

    /// Check every attached signature, and that every required signer
    /// outside `allowed_missing` has signed.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::UnexpectedSigner`] for a signature by a key the
    ///   command does not list.
    /// - [`TransactionError::Signature`] for a signature that does not verify.
    /// - [`TransactionError::MissingSignatures`] otherwise.
    pub fn verify_signatures_except(
        &self,
        allowed_missing: &BTreeSet<PublicKey>,
    ) -> Result<(), TransactionError> {
        let id = self.id();
        let required = self.tx.required_signers();
        for sig in &self.sigs {
            if !required.contains(&sig.by) {
                return Err(TransactionError::UnexpectedSigner {
                    signer: sig.by.to_base58(),
                });
            }
            if !sig.verify(&id) {
                return Err(SignatureError::VerificationFailed {
                    signer: sig.by.to_base58(),
                }
                .into());
            }
        }
        let missing: Vec<String> = self
            .missing_signers()
            .difference(allowed_missing)
            .map(PublicKey::to_base58)
            .collect();
        if !missing.is_empty() {
            return Err(TransactionError::MissingSignatures { missing });
        }
        Ok(())
    }

    pub fn verify_required_signatures(&self) -> Result<(), TransactionError> {
        self.verify_signatures_except(&BTreeSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CashCommand, CommandWithSigners};
    use crate::crypto::PartyKeypair;
    use crate::identity::Party;

    fn setup() -> (SignedTransaction, KeyManagementService, KeyManagementService) {
        let alice = KeyManagementService::new("Alice", PartyKeypair::generate());
        let bob = KeyManagementService::new("Bob", PartyKeypair::generate());
        let wtx = WireTransaction {
            inputs: vec![],
            outputs: vec![],
            command: CommandWithSigners::new(
                CashCommand::Exit,
                [alice.identity().owning_key(), bob.identity().owning_key()],
            ),
            notary: Party::new("Notary", PartyKeypair::generate().public_key()),
        };
        (SignedTransaction::new(wtx), alice, bob)
    }

    fn sign(stx: &SignedTransaction, keys: &KeyManagementService) -> TransactionSignature {
        TransactionSignature::create(keys, &keys.identity().owning_key(), &stx.id()).unwrap()
    }

    #[test]
    fn fully_signed_transaction_verifies() {
        let (stx, alice, bob) = setup();
        let a = sign(&stx, &alice);
        let b = sign(&stx, &bob);
        let stx = stx.with_signature(a).with_signature(b);
        assert!(stx.missing_signers().is_empty());
        assert!(stx.verify_required_signatures().is_ok());
    }

    #[test]
    fn missing_signer_is_reported_unless_allowed() {
        let (stx, alice, bob) = setup();
        let a = sign(&stx, &alice);
        let stx = stx.with_signature(a);

        match stx.verify_required_signatures() {
            Err(TransactionError::MissingSignatures { missing }) => {
                assert_eq!(missing, vec![bob.identity().owning_key().to_base58()]);
            }
            other => panic!("expected MissingSignatures, got {:?}", other),
        }

        let allowed: BTreeSet<_> = [bob.identity().owning_key()].into();
        assert!(stx.verify_signatures_except(&allowed).is_ok());
    }

    #[test]
    fn duplicate_signatures_are_skipped() {
        let (stx, alice, _) = setup();
        let a = sign(&stx, &alice);
        let stx = stx.with_signature(a.clone()).with_signature(a);
        assert_eq!(stx.sigs.len(), 1);
    }

    #[test]
    fn forged_signature_is_refused() {
        let (stx, alice, bob) = setup();
        let forged = TransactionSignature::new(
            bob.identity().owning_key(),
            alice.sign(&alice.identity().owning_key(), stx.id().as_bytes()).unwrap(),
        );
        let stx = stx.with_signature(forged);
        match stx.verify_signatures_except(&[bob.identity().owning_key()].into()) {
            Err(TransactionError::Signature(SignatureError::VerificationFailed { .. })) => {}
            other => panic!("expected VerificationFailed, got {:?}", other),
        }
    }

    #[test]
    fn signature_by_unlisted_key_is_refused() {
        let (stx, _, _) = setup();
        let carol = KeyManagementService::new("Carol", PartyKeypair::generate());
        let c = sign(&stx, &carol);
        let stx = stx.with_signature(c);
        assert!(matches!(
            stx.verify_signatures_except(&BTreeSet::new()),
            Err(TransactionError::UnexpectedSigner { .. })
        ));
    }

    #[test]
    fn signature_does_not_transfer_to_another_transaction() {
        let (stx, alice, _) = setup();
        let a = sign(&stx, &alice);
        let mut other = stx.tx.clone();
        other.command.value = CashCommand::Move;
        assert!(a.verify(&stx.id()));
        assert!(!a.verify(&other.id()));
    }
}
