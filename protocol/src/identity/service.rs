//! The identity resolver.
//!
//! [`IdentityResolver`] is the lookup contract the rest of the crate codes
//! against; [`IdentityService`] is the node-local implementation backed by
//! the network map (well-known parties) and every confidential certificate
//! the node has verified.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::certificate::IdentityCertificate;
use super::party::{AbstractParty, Party};
use super::IdentityError;
use crate::crypto::PublicKey;
use crate::storage::LedgerDb;

/// Maps identity references to well-known parties.
pub trait IdentityResolver: Send + Sync {
    /// The well-known party behind `party`, if this node can tell.
    fn well_known_party_from_anonymous(&self, party: &AbstractParty) -> Option<Party>;

    /// Like [`well_known_party_from_anonymous`](Self::well_known_party_from_anonymous)
    /// but failing with [`IdentityError::UnknownIdentity`].
    fn require_well_known(&self, party: &AbstractParty) -> Result<Party, IdentityError> {
        self.well_known_party_from_anonymous(party)
            .ok_or_else(|| IdentityError::UnknownIdentity {
                identity: party.to_string(),
            })
    }

    /// Grouping key: the resolved party when known, `party` itself otherwise.
    fn canonical(&self, party: &AbstractParty) -> AbstractParty {
        match self.well_known_party_from_anonymous(party) {
            Some(known) => AbstractParty::WellKnown(known),
            None => party.clone(),
        }
    }

    /// True when both references denote the same party, looking through
    /// confidential identities this node can resolve.
    fn is_same_party(&self, a: &AbstractParty, b: &AbstractParty) -> bool {
        a == b || self.canonical(a) == self.canonical(b)
    }
}

#[derive(Default)]
struct Registry {
    by_name: HashMap<String, Party>,
    by_key: HashMap<PublicKey, Party>,
    certificates: HashMap<PublicKey, IdentityCertificate>,
}

/// Node-local identity store.
///
/// Reads vastly outnumber writes (every verification resolves identities,
/// only registrations write), so a single `RwLock` over all three maps is
/// plenty.
#[derive(Default)]
pub struct IdentityService {
    registry: RwLock<Registry>,
    store: Option<LedgerDb>,
}

impl IdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that reloads the certificates persisted in `db` and
    /// persists each newly registered one. Well-known parties are not
    /// stored; the network map re-registers them.
    pub fn open(db: LedgerDb) -> Result<Self, IdentityError> {
        let svc = Self::new();
        for cert in db.certificates()? {
            svc.verify_and_register(cert)?;
        }
        Ok(Self {
            store: Some(db),
            ..svc
        })
    }

    /// Add a well-known party (network map entry). Re-registering the same
    /// party is a no-op.
    pub fn register_party(&self, party: Party) {
        let mut reg = self.registry.write();
        reg.by_key.insert(party.owning_key(), party.clone());
        reg.by_name.insert(party.name().to_string(), party);
    }

    /// Verify a confidential identity certificate and remember it.
    ///
    /// A key that is already bound to a different party is refused; the same
    /// binding arriving twice is fine.
    pub fn verify_and_register(&self, cert: IdentityCertificate) -> Result<(), IdentityError> {
        cert.verify()?;
        let key = cert.anonymous().owning_key();
        let mut reg = self.registry.write();
        if let Some(existing) = reg.certificates.get(&key) {
            if existing.well_known() != cert.well_known() {
                return Err(IdentityError::ConflictingCertificate {
                    key: key.to_base58(),
                });
            }
            return Ok(());
        }
        if let Some(db) = &self.store {
            db.put_certificate(&cert)?;
        }
        if !reg.by_key.contains_key(&cert.well_known().owning_key()) {
            let party = cert.well_known().clone();
            reg.by_name.insert(party.name().to_string(), party.clone());
            reg.by_key.insert(party.owning_key(), party);
        }
        tracing::debug!(
            anonymous = %cert.anonymous(),
            party = %cert.well_known(),
            "registered confidential identity"
        );
        reg.certificates.insert(key, cert);
        Ok(())
    }

    pub fn party_from_name(&self, name: &str) -> Option<Party> {
        self.registry.read().by_name.get(name).cloned()
    }

    /// Resolve a bare key: either a well-known key or a certified
    /// confidential one.
    pub fn party_from_key(&self, key: &PublicKey) -> Option<Party> {
        let reg = self.registry.read();
        reg.by_key
            .get(key)
            .cloned()
            .or_else(|| reg.certificates.get(key).map(|c| c.well_known().clone()))
    }

    pub fn certificate_for(&self, key: &PublicKey) -> Option<IdentityCertificate> {
        self.registry.read().certificates.get(key).cloned()
    }

    /// Certificates for every confidential identity among `parties` that this
    /// node can vouch for. Used to bundle identities with proposals.
    pub fn certificates_for<'a, I>(&self, parties: I) -> Vec<IdentityCertificate>
    where
        I: IntoIterator<Item = &'a AbstractParty>,
    {
        let reg = self.registry.read();
        let mut out: Vec<IdentityCertificate> = Vec::new();
        for party in parties {
            if let Some(cert) = reg.certificates.get(&party.owning_key()) {
                if !out.contains(cert) {
                    out.push(cert.clone());
                }
            }
        }
        out
    }

    /// Every well-known party, sorted by name.
    pub fn all_parties(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self.registry.read().by_name.values().cloned().collect();
        parties.sort_by(|a, b| a.name().cmp(b.name()));
        parties
    }
}

impl IdentityResolver for IdentityService {
    fn well_known_party_from_anonymous(&self, party: &AbstractParty) -> Option<Party> {
        match party {
            AbstractParty::WellKnown(p) => Some(p.clone()),
            AbstractParty::Anonymous(a) => self.party_from_key(&a.owning_key()),
        }
    }
}
