//! # LedgerDb — Persistent Storage Engine
//!
//! The persistence layer for a node's private view of the ledger, built on
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree             | Key                            | Value                         |
//! |------------------|--------------------------------|-------------------------------|
//! | `transactions`   | `tx_id` (32B)                  | `bincode(CommittedTransaction)` |
//! | `states`         | `StateRef` (36B)               | `bincode(StoredState)`        |
//! | `unconsumed`     | `seq` (8B BE)                  | `StateRef` (36B)              |
//! | `currency_index` | `currency` (3B) ‖ `seq` (8B BE)| `StateRef` (36B)              |
//! | `consumed`       | `StateRef` (36B)               | spending `tx_id` (32B)        |
//! | `recorded`       | `tx_id` (32B)                  | empty                         |
//! | `confidential_keys` | public key (32B)            | secret seed (32B)             |
//! | `certificates`   | confidential key (32B)         | `bincode(IdentityCertificate)` |
//! | `metadata`       | key (UTF-8)                    | value (bytes)                 |
//!
//! Sequence numbers are stored big-endian so sled's lexicographic ordering
//! matches insertion order. Range scans over `unconsumed` and prefix scans
//! over `currency_index` therefore come back oldest first, which is the
//! stable order coin selection relies on.
//!
//! Writes that span trees go through one sled transaction
//! (`(&a, &b, ..).transaction(..)`); [`reserve_sequence`] hands out
//! sequence numbers inside such a transaction.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};
use std::path::Path;

use crate::crypto::{PartyKeypair, SecureHash};
use crate::identity::IdentityCertificate;
use crate::transaction::CommittedTransaction;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => DbError::Sled(e),
        }
    }
}

/// Next sequence number to hand out.
const META_NEXT_SEQUENCE: &[u8] = b"next_sequence";

pub fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Abort a sled transaction with `err`.
pub fn abort(err: DbError) -> ConflictableTransactionError<DbError> {
    ConflictableTransactionError::Abort(err)
}

/// Reserve the next sequence number inside a transaction over `metadata`.
pub fn reserve_sequence(
    metadata: &TransactionalTree,
) -> ConflictableTransactionResult<u64, DbError> {
    let current = metadata
        .get(META_NEXT_SEQUENCE)?
        .and_then(|bytes| read_u64(&bytes))
        .unwrap_or(0);
    let next = current.saturating_add(1);
    metadata.insert(META_NEXT_SEQUENCE, &next.to_be_bytes()[..])?;
    Ok(next)
}

/// Persistent storage engine for one node.
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// `LedgerDb` is cheap to clone and share. Updates that must be seen
/// together run in one sled transaction over the trees involved.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    transactions: Tree,
    states: Tree,
    unconsumed: Tree,
    currency_index: Tree,
    consumed: Tree,
    recorded: Tree,
    confidential_keys: Tree,
    certificates: Tree,
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A database that lives in memory and disappears on drop.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            transactions: db.open_tree("transactions")?,
            states: db.open_tree("states")?,
            unconsumed: db.open_tree("unconsumed")?,
            currency_index: db.open_tree("currency_index")?,
            consumed: db.open_tree("consumed")?,
            recorded: db.open_tree("recorded")?,
            confidential_keys: db.open_tree("confidential_keys")?,
            certificates: db.open_tree("certificates")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// Open an extra named tree. The notary keeps its consumed set here.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    pub fn states(&self) -> &Tree {
        &self.states
    }

    pub fn unconsumed(&self) -> &Tree {
        &self.unconsumed
    }

    pub fn currency_index(&self) -> &Tree {
        &self.currency_index
    }

    pub fn consumed(&self) -> &Tree {
        &self.consumed
    }

    pub fn transactions_tree(&self) -> &Tree {
        &self.transactions
    }

    pub fn recorded(&self) -> &Tree {
        &self.recorded
    }

    pub fn metadata(&self) -> &Tree {
        &self.metadata
    }

    // -- Transaction operations ---------------------------------------------

    pub fn put_transaction(&self, tx: &CommittedTransaction) -> DbResult<()> {
        let bytes = encode(tx)?;
        self.transactions.insert(tx.id().as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_transaction(&self, id: &SecureHash) -> DbResult<Option<CommittedTransaction>> {
        match self.transactions.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has_transaction(&self, id: &SecureHash) -> DbResult<bool> {
        Ok(self.transactions.contains_key(id.as_bytes())?)
    }

    /// Mark `id` as recorded into the unspent index, as opposed to stored
    /// only for resolution.
    pub fn mark_recorded(&self, id: &SecureHash) -> DbResult<()> {
        self.recorded.insert(id.as_bytes(), Vec::<u8>::new())?;
        Ok(())
    }

    pub fn is_recorded(&self, id: &SecureHash) -> DbResult<bool> {
        Ok(self.recorded.contains_key(id.as_bytes())?)
    }

    /// Every stored transaction, in id order.
    pub fn transactions(&self) -> DbResult<Vec<CommittedTransaction>> {
        self.transactions
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    // -- Metadata operations ------------------------------------------------

    /// Reserve the next sequence number. Starts at 1 and never repeats,
    /// including across reopen.
    pub fn next_sequence(&self) -> DbResult<u64> {
        let updated = self
            .metadata
            .update_and_fetch(META_NEXT_SEQUENCE, |old| {
                let current = old.and_then(read_u64).unwrap_or(0);
                Some(current.saturating_add(1).to_be_bytes().to_vec())
            })?
            .ok_or_else(|| DbError::NotFound("next_sequence".to_string()))?;
        read_u64(&updated)
            .ok_or_else(|| DbError::Serialization("invalid sequence bytes".to_string()))
    }

    /// Highest sequence number handed out so far, or 0.
    pub fn last_sequence(&self) -> DbResult<u64> {
        Ok(self
            .metadata
            .get(META_NEXT_SEQUENCE)?
            .and_then(|bytes| read_u64(&bytes))
            .unwrap_or(0))
    }

    // -- Identity operations ------------------------------------------------

    pub fn put_confidential_key(&self, keypair: &PartyKeypair) -> DbResult<()> {
        self.confidential_keys.insert(
            keypair.public_key().as_bytes(),
            &keypair.secret_key_bytes()[..],
        )?;
        Ok(())
    }

    /// Every confidential keypair stored so far.
    pub fn confidential_keys(&self) -> DbResult<Vec<PartyKeypair>> {
        self.confidential_keys
            .iter()
            .values()
            .map(|v| {
                let v = v?;
                let seed: [u8; 32] = v
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid key seed".to_string()))?;
                Ok(PartyKeypair::from_seed(&seed))
            })
            .collect()
    }

    pub fn put_certificate(&self, cert: &IdentityCertificate) -> DbResult<()> {
        self.certificates
            .insert(cert.anonymous().owning_key().as_bytes(), encode(cert)?)?;
        Ok(())
    }

    pub fn certificates(&self) -> DbResult<Vec<IdentityCertificate>> {
        self.certificates
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    // -- Utility operations -------------------------------------------------

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

pub fn read_u64(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.transaction_count(), 0);
        assert!(db.states().is_empty());
    }

    #[test]
    fn sequence_is_monotonic() {
        let db = LedgerDb::open_temporary().unwrap();
        assert_eq!(db.next_sequence().unwrap(), 1);
        assert_eq!(db.next_sequence().unwrap(), 2);
        assert_eq!(db.next_sequence().unwrap(), 3);
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = LedgerDb::open(dir.path()).expect("should open db");
            db.next_sequence().unwrap();
            db.next_sequence().unwrap();
            db.flush().unwrap();
        }
        let db = LedgerDb::open(dir.path()).expect("should reopen db");
        assert_eq!(db.next_sequence().unwrap(), 3);
    }

    #[test]
    fn reserved_sequences_share_the_counter() {
        let db = LedgerDb::open_temporary().unwrap();
        assert_eq!(db.next_sequence().unwrap(), 1);
        let reserved: DbResult<u64> = db
            .metadata()
            .transaction(|meta| reserve_sequence(meta))
            .map_err(DbError::from);
        assert_eq!(reserved.unwrap(), 2);
        assert_eq!(db.last_sequence().unwrap(), 2);
        assert_eq!(db.next_sequence().unwrap(), 3);
    }

    #[test]
    fn confidential_keys_and_certificates_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let alice_kp = PartyKeypair::generate();
        let alice = crate::identity::Party::new("Alice", alice_kp.public_key());
        let confidential = PartyKeypair::generate();
        let anon = crate::identity::AnonymousParty::new(confidential.public_key());
        let cert = IdentityCertificate::issue(&alice, &alice_kp, anon).unwrap();
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            db.put_confidential_key(&confidential).unwrap();
            db.put_certificate(&cert).unwrap();
            db.flush().unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        let keys = db.confidential_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].public_key(), confidential.public_key());
        assert_eq!(db.certificates().unwrap(), vec![cert]);
    }

    #[test]
    fn missing_transaction_is_none() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.get_transaction(&SecureHash::ZERO).unwrap().is_none());
        assert!(!db.has_transaction(&SecureHash::ZERO).unwrap());
    }

    #[test]
    fn extra_trees_are_independent() {
        let db = LedgerDb::open_temporary().unwrap();
        let tree = db.open_tree("notary_consumed").unwrap();
        tree.insert(b"k", &b"v"[..]).unwrap();
        assert!(db.consumed().is_empty());
        assert_eq!(tree.len(), 1);
    }
}
