//! Confidential identity certificates.
//!
//! A certificate says "this anonymous key belongs to this well-known party"
//! and is signed by the well-known key, so anyone can check it without
//! asking the owner. Nodes pass certificates around so that every
//! participant of a state can resolve every confidential identity in it.

use serde::{Deserialize, Serialize};

use super::party::{AnonymousParty, Party};
use super::IdentityError;
use crate::config::IDENTITY_CERT_DOMAIN;
use crate::crypto::{PartyKeypair, Signature};

/// Binding of a confidential key to its well-known owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    anonymous: AnonymousParty,
    well_known: Party,
    signature: Signature,
}

impl IdentityCertificate {
    /// Sign a binding with the well-known party's own keypair.
    pub fn issue(
        well_known: &Party,
        well_known_keypair: &PartyKeypair,
        anonymous: AnonymousParty,
    ) -> Result<Self, IdentityError> {
        if well_known_keypair.public_key() != well_known.owning_key() {
            return Err(IdentityError::KeyMismatch {
                party: well_known.name().to_string(),
            });
        }
        let signature = well_known_keypair.sign(&Self::signable_bytes(well_known, &anonymous));
        Ok(Self {
            anonymous,
            well_known: well_known.clone(),
            signature,
        })
    }

    pub fn anonymous(&self) -> AnonymousParty {
        self.anonymous
    }

    pub fn well_known(&self) -> &Party {
        &self.well_known
    }

    /// Check the signature. A certificate that fails here must never be
    /// registered.
    pub fn verify(&self) -> Result<(), IdentityError> {
        let bytes = Self::signable_bytes(&self.well_known, &self.anonymous);
        if self.well_known.owning_key().verify(&bytes, &self.signature) {
            Ok(())
        } else {
            Err(IdentityError::InvalidCertificate {
                key: self.anonymous.owning_key().to_base58(),
            })
        }
    }

    fn signable_bytes(well_known: &Party, anonymous: &AnonymousParty) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IDENTITY_CERT_DOMAIN.len() + 128);
        buf.extend_from_slice(IDENTITY_CERT_DOMAIN);
        buf.push(0x00);
        buf.extend_from_slice(well_known.name().as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(well_known.owning_key().as_bytes());
        buf.extend_from_slice(anonymous.owning_key().as_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> (Party, PartyKeypair) {
        let kp = PartyKeypair::generate();
        (Party::new("Bank", kp.public_key()), kp)
    }

    #[test]
    fn issued_certificate_verifies() {
        let (party, kp) = bank();
        let anon = AnonymousParty::new(PartyKeypair::generate().public_key());
        let cert = IdentityCertificate::issue(&party, &kp, anon).unwrap();
        assert!(cert.verify().is_ok());
        assert_eq!(cert.well_known(), &party);
        assert_eq!(cert.anonymous(), anon);
    }

    #[test]
    fn issuing_with_someone_elses_key_fails() {
        let (party, _) = bank();
        let stranger = PartyKeypair::generate();
        let anon = AnonymousParty::new(PartyKeypair::generate().public_key());
        match IdentityCertificate::issue(&party, &stranger, anon) {
            Err(IdentityError::KeyMismatch { .. }) => {}
            other => panic!("expected KeyMismatch, got {:?}", other),
        }
    }

    #[test]
    fn rebinding_to_another_party_breaks_the_signature() {
        let (party, kp) = bank();
        let anon = AnonymousParty::new(PartyKeypair::generate().public_key());
        let mut cert = IdentityCertificate::issue(&party, &kp, anon).unwrap();
        cert.well_known = Party::new("Mallory", PartyKeypair::generate().public_key());
        assert!(cert.verify().is_err());
    }
}
