//! The per-party vault.
//!
//! A vault stores every transaction its node has seen and indexes the
//! outputs the node is a participant of. Records are appended as committed
//! transactions land and are marked consumed when a later transaction
//! spends them; nothing is ever edited in place.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::transaction::{TransactionResult, Transactional};
use std::collections::BTreeMap;
use tracing::debug;

use crate::crypto::{PublicKey, SecureHash};
use crate::identity::{AbstractParty, IdentityResolver};
use crate::state::{CurrencyCode, QueryableState, StateAndRef, StateRef, MYCASH_SCHEMA_V1};
use crate::storage::{abort, decode, encode, reserve_sequence, DbError, DbResult, LedgerDb};
use crate::transaction::CommittedTransaction;

/// Value in the `states` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredState {
    state: StateAndRef,
    sequence: u64,
}

/// Filter for [`Vault::query_unspent`]. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashQuery {
    pub owner: Option<AbstractParty>,
    pub issuer: Option<AbstractParty>,
    pub currency: Option<CurrencyCode>,
}

impl CashQuery {
    pub fn owned_by(owner: impl Into<AbstractParty>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn issued_by(mut self, issuer: impl Into<AbstractParty>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn in_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = Some(currency);
        self
    }

    /// Match by reference only.
    fn matches_exact(&self, state: &StateAndRef) -> bool {
        let data = state.data();
        self.owner.as_ref().map_or(true, |o| o == data.owner())
            && self.issuer.as_ref().map_or(true, |i| i == data.issuer())
            && self.currency.as_ref().map_or(true, |c| c == data.currency())
    }

    /// Match looking through confidential identities `identities` can resolve.
    fn matches_resolved(&self, state: &StateAndRef, identities: &dyn IdentityResolver) -> bool {
        let data = state.data();
        self.owner
            .as_ref()
            .map_or(true, |o| identities.is_same_party(o, data.owner()))
            && self
                .issuer
                .as_ref()
                .map_or(true, |i| identities.is_same_party(i, data.issuer()))
            && self.currency.as_ref().map_or(true, |c| c == data.currency())
    }
}

/// Unconsumed total for one (issuer, currency) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub issuer: AbstractParty,
    pub currency: CurrencyCode,
    pub amount: u64,
    pub records: usize,
}

/// What [`Vault::record_transaction`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub already_recorded: bool,
    pub consumed: Vec<StateRef>,
    pub produced: Vec<StateRef>,
}

/// One node's store of cash records.
pub struct Vault {
    db: LedgerDb,
    /// Serializes writers; readers go straight to sled.
    write_lock: Mutex<()>,
}

impl Vault {
    pub fn new(db: LedgerDb) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    pub fn open_temporary() -> DbResult<Self> {
        Ok(Self::new(LedgerDb::open_temporary()?))
    }

    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    /// Store `committed`, consume any of its inputs we hold, and append the
    /// outputs whose owner `is_mine` accepts as unconsumed records.
    ///
    /// Everything lands in one sled transaction, so a crash leaves either
    /// all of it or none. Idempotent: a transaction already marked recorded
    /// changes nothing, and an output already in `states` is never indexed
    /// a second time.
    pub fn record_transaction<F>(
        &self,
        committed: &CommittedTransaction,
        is_mine: F,
    ) -> DbResult<RecordSummary>
    where
        F: Fn(&AbstractParty) -> bool,
    {
        let _guard = self.write_lock.lock();
        let id = committed.id();
        let tx_bytes = encode(committed)?;
        let outputs: Vec<StateAndRef> = committed
            .stx
            .tx
            .output_states()
            .into_iter()
            .filter(|s| is_mine(s.data().owner()))
            .collect();

        let db = &self.db;
        let trees = (
            db.transactions_tree(),
            db.states(),
            db.unconsumed(),
            db.currency_index(),
            db.consumed(),
            db.recorded(),
            db.metadata(),
        );
        let result: TransactionResult<RecordSummary, DbError> =
            trees.transaction(|(txs, states, unspent, index, consumed, recorded, meta)| {
                if recorded.get(id.as_bytes())?.is_some() {
                    return Ok(RecordSummary {
                        already_recorded: true,
                        ..RecordSummary::default()
                    });
                }
                txs.insert(&id.as_bytes()[..], tx_bytes.clone())?;
                let mut summary = RecordSummary::default();

                for input in &committed.stx.tx.inputs {
                    let key = input.to_key();
                    let Some(bytes) = states.get(key)? else {
                        continue;
                    };
                    if consumed.get(key)?.is_some() {
                        continue;
                    }
                    let stored: StoredState = decode(&bytes).map_err(abort)?;
                    consumed.insert(&key[..], &id.as_bytes()[..])?;
                    unspent.remove(&stored.sequence.to_be_bytes()[..])?;
                    index.remove(currency_key(
                        stored.state.data().currency(),
                        stored.sequence,
                    ))?;
                    summary.consumed.push(*input);
                }

                for state in &outputs {
                    let key = state.reference.to_key();
                    if states.get(key)?.is_some() {
                        continue;
                    }
                    let sequence = reserve_sequence(meta)?;
                    let stored = encode(&StoredState {
                        state: state.clone(),
                        sequence,
                    })
                    .map_err(abort)?;
                    states.insert(&key[..], stored)?;
                    unspent.insert(&sequence.to_be_bytes()[..], &key[..])?;
                    index.insert(index_key(state, sequence), &key[..])?;
                    summary.produced.push(state.reference);
                }
                recorded.insert(&id.as_bytes()[..], Vec::<u8>::new())?;
                Ok(summary)
            });
        let summary = result?;

        debug!(
            tx_id = %id,
            consumed = summary.consumed.len(),
            produced = summary.produced.len(),
            already_recorded = summary.already_recorded,
            "recorded transaction"
        );
        Ok(summary)
    }

    /// Store a transaction for resolution only, without touching the
    /// unspent index.
    pub fn store_dependency(&self, committed: &CommittedTransaction) -> DbResult<()> {
        let _guard = self.write_lock.lock();
        if !self.db.has_transaction(&committed.id())? {
            self.db.put_transaction(committed)?;
        }
        Ok(())
    }

    /// Unconsumed records matching `query` by reference, oldest first.
    pub fn query_unspent(&self, query: &CashQuery) -> DbResult<Vec<StateAndRef>> {
        Ok(self
            .scan_unspent(query.currency.as_ref())?
            .into_iter()
            .filter(|s| query.matches_exact(s))
            .collect())
    }

    /// Like [`query_unspent`](Self::query_unspent), but owner and issuer
    /// filters also match confidential identities of the named parties.
    pub fn query_unspent_resolved(
        &self,
        query: &CashQuery,
        identities: &dyn IdentityResolver,
    ) -> DbResult<Vec<StateAndRef>> {
        Ok(self
            .scan_unspent(query.currency.as_ref())?
            .into_iter()
            .filter(|s| query.matches_resolved(s, identities))
            .collect())
    }

    fn scan_unspent(&self, currency: Option<&CurrencyCode>) -> DbResult<Vec<StateAndRef>> {
        let refs: Vec<sled::IVec> = match currency {
            Some(code) => self
                .db
                .currency_index()
                .scan_prefix(code.as_str().as_bytes())
                .values()
                .collect::<Result<Vec<_>, sled::Error>>()?,
            None => self
                .db
                .unconsumed()
                .iter()
                .values()
                .collect::<Result<Vec<_>, sled::Error>>()?,
        };
        refs.iter()
            .map(|key| -> DbResult<StateAndRef> {
                let bytes = self
                    .db
                    .states()
                    .get(key)?
                    .ok_or_else(|| DbError::NotFound(hex::encode(key)))?;
                let stored: StoredState = decode(&bytes)?;
                Ok(stored.state)
            })
            .collect()
    }

    /// The output at `reference` from any transaction we have stored,
    /// consumed or not.
    pub fn load_state(&self, reference: &StateRef) -> DbResult<Option<StateAndRef>> {
        Ok(self
            .db
            .get_transaction(&reference.tx_id)?
            .and_then(|tx| tx.stx.tx.out_ref(reference)))
    }

    pub fn get_transaction(&self, id: &SecureHash) -> DbResult<Option<CommittedTransaction>> {
        self.db.get_transaction(id)
    }

    pub fn is_consumed(&self, reference: &StateRef) -> DbResult<bool> {
        Ok(self.db.consumed().contains_key(reference.to_key())?)
    }

    /// The transaction that spent `reference`, if we saw it.
    pub fn consumed_by(&self, reference: &StateRef) -> DbResult<Option<SecureHash>> {
        match self.db.consumed().get(reference.to_key())? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid tx id bytes".to_string()))?;
                Ok(Some(SecureHash::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Unconsumed totals per (issuer, currency), in first-seen order.
    pub fn balances(&self) -> DbResult<Vec<Balance>> {
        let mut order: Vec<(PublicKey, CurrencyCode)> = Vec::new();
        let mut totals: BTreeMap<(PublicKey, CurrencyCode), Balance> = BTreeMap::new();
        for state in self.scan_unspent(None)? {
            let data = state.data();
            let key = (data.issuer().owning_key(), data.currency().clone());
            let entry = totals.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Balance {
                    issuer: data.issuer().clone(),
                    currency: data.currency().clone(),
                    amount: 0,
                    records: 0,
                }
            });
            entry.amount = entry.amount.saturating_add(data.amount());
            entry.records += 1;
        }
        Ok(order.iter().filter_map(|k| totals.remove(k)).collect())
    }

    pub fn unspent_count(&self) -> usize {
        self.db.unconsumed().len()
    }

    /// Highest sequence handed out so far, or 0. Spending records never
    /// lowers it.
    pub fn last_sequence(&self) -> DbResult<u64> {
        self.db.last_sequence()
    }
}

fn currency_key(currency: &CurrencyCode, sequence: u64) -> Vec<u8> {
    let mut key = currency.as_str().as_bytes().to_vec();
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// `currency_index` key for a new record: the persisted row's index prefix
/// followed by the sequence.
fn index_key(state: &StateAndRef, sequence: u64) -> Vec<u8> {
    let mut key = state
        .data()
        .generate_mapped_object(&MYCASH_SCHEMA_V1)
        .map(|row| row.currency_index_prefix())
        .unwrap_or_else(|| state.data().currency().as_str().as_bytes().to_vec());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}
