//! Per-transaction cache of confidential identities.
//!
//! One flow instance owns one [`ConfidentialIdentities`]. Once a
//! counterparty has a confidential identity for this transaction it is
//! reused for every further reference to that counterparty, and our own
//! confidential identity is generated at most once. The cache never
//! outlives the flow.

use std::collections::HashMap;

use super::certificate::IdentityCertificate;
use super::party::{AnonymousParty, Party};
use crate::crypto::PublicKey;

#[derive(Debug, Default)]
pub struct ConfidentialIdentities {
    me: Option<(AnonymousParty, IdentityCertificate)>,
    others: HashMap<PublicKey, AnonymousParty>,
}

impl ConfidentialIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our own confidential identity and its certificate, if already chosen.
    pub fn me(&self) -> Option<&(AnonymousParty, IdentityCertificate)> {
        self.me.as_ref()
    }

    /// Record our confidential identity. The first one wins.
    pub fn set_me(&mut self, anonymous: AnonymousParty, cert: IdentityCertificate) {
        if self.me.is_none() {
            self.me = Some((anonymous, cert));
        }
    }

    /// The confidential identity already in use for `party`.
    pub fn get(&self, party: &Party) -> Option<AnonymousParty> {
        self.others.get(&party.owning_key()).copied()
    }

    pub fn insert(&mut self, party: &Party, anonymous: AnonymousParty) {
        self.others.entry(party.owning_key()).or_insert(anonymous);
    }

    pub fn len(&self) -> usize {
        self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.others.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PartyKeypair;

    #[test]
    fn first_identity_for_a_party_sticks() {
        let bob = Party::new("Bob", PartyKeypair::generate().public_key());
        let a1 = AnonymousParty::new(PartyKeypair::generate().public_key());
        let a2 = AnonymousParty::new(PartyKeypair::generate().public_key());

        let mut cache = ConfidentialIdentities::new();
        assert!(cache.get(&bob).is_none());
        cache.insert(&bob, a1);
        cache.insert(&bob, a2);
        assert_eq!(cache.get(&bob), Some(a1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn own_identity_is_set_once() {
        let kp = PartyKeypair::generate();
        let me = Party::new("Alice", kp.public_key());
        let a1 = AnonymousParty::new(PartyKeypair::generate().public_key());
        let a2 = AnonymousParty::new(PartyKeypair::generate().public_key());
        let c1 = IdentityCertificate::issue(&me, &kp, a1).unwrap();
        let c2 = IdentityCertificate::issue(&me, &kp, a2).unwrap();

        let mut cache = ConfidentialIdentities::new();
        cache.set_me(a1, c1);
        cache.set_me(a2, c2);
        assert_eq!(cache.me().map(|(a, _)| *a), Some(a1));
    }
}
