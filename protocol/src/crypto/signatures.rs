//! # Digital Signatures
//!
//! Thin wrappers over [`PartyKeypair::sign`] and [`PublicKey::verify`], plus
//! batch verification for checking every signature on a transaction in one
//! call. All signing in the crate goes through here or through the key
//! management service, which makes it easy to audit.

use thiserror::Error;

use super::keys::{PartyKeypair, PublicKey, Signature};

/// Errors during signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// One signature in a batch failed; `signer` names whose it was.
    #[error("signature verification failed for key {signer}")]
    VerificationFailed { signer: String },
}

/// Sign `message` with `keypair`.
///
/// ```
/// use mycash_protocol::crypto::{sign, verify, PartyKeypair};
///
/// let kp = PartyKeypair::generate();
/// let sig = sign(&kp, b"exit 70 USD");
/// assert!(verify(&kp.public_key(), b"exit 70 USD", &sig));
/// ```
pub fn sign(keypair: &PartyKeypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a single signature.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Verify many `(key, signature)` pairs over the same message.
///
/// Fails on the first bad signature and reports its key. Transactions are
/// always signed over their id, so the shared-message shape is the only one
/// the ledger needs.
pub fn batch_verify<'a, I>(message: &[u8], items: I) -> Result<(), SignatureError>
where
    I: IntoIterator<Item = (&'a PublicKey, &'a Signature)>,
{
    for (key, signature) in items {
        if !verify(key, message, signature) {
            return Err(SignatureError::VerificationFailed {
                signer: key.to_base58(),
            });
        }
    }
    Ok(())
}
