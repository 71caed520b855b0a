//! Per-node key management.
//!
//! A node signs with its well-known key and with every confidential key it
//! has ever generated. All of them live here, keyed by public key, and
//! nowhere else. A service opened over a [`LedgerDb`] writes every
//! confidential key through to it before handing the key out.

use dashmap::DashMap;
use std::sync::Arc;

use super::certificate::IdentityCertificate;
use super::party::{AnonymousParty, Party};
use super::IdentityError;
use crate::crypto::{PartyKeypair, PublicKey, Signature};
use crate::storage::LedgerDb;

/// Holds a node's signing keys.
pub struct KeyManagementService {
    identity: Party,
    identity_keypair: PartyKeypair,
    keys: DashMap<PublicKey, Arc<PartyKeypair>>,
    store: Option<LedgerDb>,
}

impl KeyManagementService {
    pub fn new(name: impl Into<String>, identity_keypair: PartyKeypair) -> Self {
        let identity = Party::new(name, identity_keypair.public_key());
        let keys = DashMap::new();
        keys.insert(
            identity_keypair.public_key(),
            Arc::new(identity_keypair.clone()),
        );
        Self {
            identity,
            identity_keypair,
            keys,
            store: None,
        }
    }

    /// Like [`new`](Self::new), reloading every confidential key persisted
    /// in `db` and persisting the ones generated from now on.
    pub fn open(
        name: impl Into<String>,
        identity_keypair: PartyKeypair,
        db: LedgerDb,
    ) -> Result<Self, IdentityError> {
        let mut kms = Self::new(name, identity_keypair);
        for keypair in db.confidential_keys()? {
            kms.keys.insert(keypair.public_key(), Arc::new(keypair));
        }
        tracing::debug!(
            party = %kms.identity,
            keys = kms.keys.len(),
            "loaded signing keys"
        );
        kms.store = Some(db);
        Ok(kms)
    }

    /// Our well-known identity.
    pub fn identity(&self) -> &Party {
        &self.identity
    }

    pub fn owns(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    /// The subset of `candidates` we can sign for, in input order.
    pub fn filter_my_keys<'a, I>(&self, candidates: I) -> Vec<PublicKey>
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        candidates
            .into_iter()
            .filter(|k| self.owns(k))
            .copied()
            .collect()
    }

    pub fn sign(&self, key: &PublicKey, message: &[u8]) -> Result<Signature, IdentityError> {
        let keypair = self
            .keys
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IdentityError::KeyNotHeld {
                key: key.to_base58(),
            })?;
        Ok(keypair.sign(message))
    }

    /// Generate a new confidential key and certify it with our well-known key.
    pub fn fresh_confidential_identity(
        &self,
    ) -> Result<(AnonymousParty, IdentityCertificate), IdentityError> {
        let keypair = PartyKeypair::generate();
        let anonymous = AnonymousParty::new(keypair.public_key());
        let cert = IdentityCertificate::issue(&self.identity, &self.identity_keypair, anonymous)?;
        if let Some(db) = &self.store {
            db.put_confidential_key(&keypair)?;
        }
        self.keys.insert(anonymous.owning_key(), Arc::new(keypair));
        Ok((anonymous, cert))
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_with_identity_and_confidential_keys() {
        let kms = KeyManagementService::new("Alice", PartyKeypair::generate());
        let me = kms.identity().owning_key();
        let sig = kms.sign(&me, b"tx").unwrap();
        assert!(me.verify(b"tx", &sig));

        let (anon, cert) = kms.fresh_confidential_identity().unwrap();
        assert!(cert.verify().is_ok());
        assert!(kms.owns(&anon.owning_key()));
        let sig = kms.sign(&anon.owning_key(), b"tx").unwrap();
        assert!(anon.owning_key().verify(b"tx", &sig));
        assert_eq!(kms.key_count(), 2);
    }

    #[test]
    fn reopened_service_keeps_confidential_keys() {
        let dir = tempfile::tempdir().unwrap();
        let identity = PartyKeypair::generate();
        let anon = {
            let db = LedgerDb::open(dir.path()).unwrap();
            let kms = KeyManagementService::open("Alice", identity.clone(), db.clone()).unwrap();
            let (anon, _) = kms.fresh_confidential_identity().unwrap();
            db.flush().unwrap();
            anon
        };

        let db = LedgerDb::open(dir.path()).unwrap();
        let kms = KeyManagementService::open("Alice", identity, db).unwrap();
        assert!(kms.owns(&anon.owning_key()));
        let sig = kms.sign(&anon.owning_key(), b"tx").unwrap();
        assert!(anon.owning_key().verify(b"tx", &sig));
        assert_eq!(kms.key_count(), 2);
    }

    #[test]
    fn refuses_to_sign_for_foreign_key() {
        let kms = KeyManagementService::new("Alice", PartyKeypair::generate());
        let foreign = PartyKeypair::generate().public_key();
        match kms.sign(&foreign, b"tx") {
            Err(IdentityError::KeyNotHeld { .. }) => {}
            other => panic!("expected KeyNotHeld, got {:?}", other),
        }
        assert!(kms.filter_my_keys([&foreign]).is_empty());
    }
}
