//! Single-node notary over sled.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sled::transaction::{TransactionResult, Transactional};
use sled::Tree;
use std::collections::HashSet;
use tracing::{info, warn};

use super::{FinalizationGateway, GatewayError};
use crate::crypto::PartyKeypair;
use crate::identity::{KeyManagementService, Party};
use crate::state::StateRef;
use crate::storage::{abort, encode, reserve_sequence, DbError, DbResult, LedgerDb};
use crate::transaction::{CommittedTransaction, SignedTransaction, TransactionSignature};

const CONSUMED_TREE: &str = "notary_consumed";

/// Serializes every commit behind one mutex. Check-then-commit for a single
/// transaction therefore never interleaves with another, which is what makes
/// the consumed set authoritative.
pub struct SimpleNotary {
    keys: KeyManagementService,
    db: LedgerDb,
    consumed: Tree,
    commit_lock: Mutex<()>,
}

impl SimpleNotary {
    pub fn new(name: impl Into<String>, keypair: PartyKeypair, db: LedgerDb) -> DbResult<Self> {
        let consumed = db.open_tree(CONSUMED_TREE)?;
        Ok(Self {
            keys: KeyManagementService::new(name, keypair),
            db,
            consumed,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn open_temporary(name: impl Into<String>) -> DbResult<Self> {
        Self::new(name, PartyKeypair::generate(), LedgerDb::open_temporary()?)
    }

    /// Number of refs consumed so far.
    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }

    fn commit(&self, stx: SignedTransaction) -> Result<CommittedTransaction, GatewayError> {
        let identity = self.keys.identity();
        if stx.tx.notary != *identity {
            return Err(GatewayError::WrongNotary {
                expected: identity.name().to_string(),
                found: stx.tx.notary.name().to_string(),
            });
        }
        stx.verify_required_signatures()
            .map_err(|e| GatewayError::InvalidSignatures {
                reason: e.to_string(),
            })?;

        let mut seen = HashSet::with_capacity(stx.tx.inputs.len());
        if let Some(dup) = stx.tx.inputs.iter().find(|r| !seen.insert(**r)) {
            return Err(GatewayError::DuplicateInput { reference: *dup });
        }

        let id = stx.id();
        let notary_key = identity.owning_key();
        let notary_signature = TransactionSignature::create(&self.keys, &notary_key, &id)?;
        let committed_at = Utc::now();
        let _guard = self.commit_lock.lock();

        // Conflict check, sequence, stored commit and consumed marks all
        // land together or not at all.
        let trees = (&self.consumed, self.db.transactions_tree(), self.db.metadata());
        let result: TransactionResult<Result<CommittedTransaction, Vec<StateRef>>, DbError> =
            trees.transaction(|(consumed, transactions, metadata)| {
                let mut conflicts = Vec::new();
                for input in &stx.tx.inputs {
                    if consumed.get(input.to_key())?.is_some() {
                        conflicts.push(*input);
                    }
                }
                if !conflicts.is_empty() {
                    return Ok(Err(conflicts));
                }

                let committed = CommittedTransaction {
                    notary_signature: notary_signature.clone(),
                    stx: stx.clone(),
                    sequence: reserve_sequence(metadata)?,
                    committed_at,
                };
                transactions.insert(&id.as_bytes()[..], encode(&committed).map_err(abort)?)?;
                for input in &stx.tx.inputs {
                    consumed.insert(&input.to_key()[..], &id.as_bytes()[..])?;
                }
                Ok(Ok(committed))
            });
        let committed = match result.map_err(DbError::from)? {
            Ok(committed) => committed,
            Err(consumed) => {
                warn!(tx_id = %id, conflicts = consumed.len(), "double spend refused");
                return Err(GatewayError::Conflict { consumed });
            }
        };
        let sequence = committed.sequence;

        info!(tx_id = %id, sequence, "transaction notarised");
        Ok(committed)
    }
}

#[async_trait]
impl FinalizationGateway for SimpleNotary {
    fn identity(&self) -> &Party {
        self.keys.identity()
    }

    async fn submit(&self, stx: SignedTransaction) -> Result<CommittedTransaction, GatewayError> {
        self.commit(stx)
    }

    async fn is_consumed(&self, reference: &StateRef) -> Result<bool, GatewayError> {
        Ok(self
            .consumed
            .contains_key(reference.to_key())
            .map_err(DbError::from)?)
    }
}
