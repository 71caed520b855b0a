//! # Flows
//!
//! The multi-party protocols that move cash.
//!
//! ```text
//! progress.rs   — SigningState machine and ProgressEvent stream
//! collect.rs    — fan a proposal out and gather countersignatures
//! responder.rs  — the counterparty side: verify, check, sign
//! approvals.rs  — operator consent for flows other parties start
//! finality.rs   — notarise, record, distribute
//! anonymize.rs  — confidential identity swaps and registration
//! issue.rs, move_cash.rs, exit.rs — the business flows
//! ```
//!
//! Every business flow ends the same way: build, verify locally, sign what
//! we can, collect the rest, notarise. A flow suspends only while waiting
//! on a counterparty or on the gateway.

pub mod anonymize;
pub mod approvals;
pub mod collect;
pub mod exit;
pub mod finality;
pub mod issue;
pub mod move_cash;
pub mod progress;
pub mod responder;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::contract::{CashCommand, ContractError};
use crate::identity::{IdentityCertificate, IdentityError, Party};
use crate::network::NetworkError;
use crate::node::ServiceHub;
use crate::state::{CurrencyCode, StateError, StateRef};
use crate::storage::DbError;
use crate::transaction::{
    BuilderError, CommittedTransaction, ResolutionError, SignedTransaction, TransactionBuilder,
    TransactionError, TransactionSignature,
};
use crate::vault::SelectionError;

pub use approvals::FlowApprovals;
pub use progress::{CollectionError, FlowKind, ProgressEvent, SignatureCollection, SigningState};

/// Everything a flow can fail with.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("contract rejected the transaction: {0}")]
    Validation(#[from] ContractError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("inputs already consumed: {consumed:?}")]
    Conflict { consumed: Vec<StateRef> },

    #[error("notary failure: {0}")]
    Notary(String),

    #[error("{party} refused to sign: {reason}")]
    Rejected { party: String, reason: String },

    #[error("not a stakeholder in this {command} transaction")]
    NotStakeholder { command: CashCommand },

    /// We would sign away or mint our own cash for a flow nobody approved.
    #[error("{command} started by {initiator} has no approval")]
    Unauthorised {
        initiator: String,
        command: CashCommand,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FlowError {
    /// Conflicts are the only failure worth rebuilding for.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// One line of an issue or move request, in well-known terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyCashData {
    pub issuer: Party,
    pub owner: Party,
    pub amount: u64,
    pub currency: CurrencyCode,
}

impl MyCashData {
    pub fn new(issuer: &Party, owner: &Party, amount: u64, currency: CurrencyCode) -> Self {
        Self {
            issuer: issuer.clone(),
            owner: owner.clone(),
            amount,
            currency,
        }
    }
}

/// An unspent record with its identities resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub reference: StateRef,
    pub data: MyCashData,
}

/// Verify, sign our part, collect the rest and notarise.
///
/// `dependencies` are the committed transactions behind the builder's
/// inputs. Certificates for every confidential identity the transaction
/// mentions are attached automatically.
pub(crate) async fn complete(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    builder: TransactionBuilder,
    dependencies: Vec<CommittedTransaction>,
) -> Result<CommittedTransaction, FlowError> {
    let (wtx, ltx) = builder.build_resolved()?;
    hub.contract().verify(&ltx, hub.identities())?;

    let parties = ltx
        .inputs
        .iter()
        .flat_map(|i| [i.data().issuer(), i.data().owner()])
        .chain(ltx.outputs.iter().flat_map(|o| [o.issuer(), o.owner()]));
    let certificates: Vec<IdentityCertificate> = hub.identities().certificates_for(parties);

    let id = wtx.id();
    let mine = hub.keys().filter_my_keys(wtx.required_signers());
    let mut stx = SignedTransaction::new(wtx);
    for key in &mine {
        stx.add_signature(TransactionSignature::create(hub.keys(), key, &id)?);
    }
    machine.propose(id)?;

    let stx = collect::collect_signatures(hub, machine, stx, &dependencies, &certificates).await?;
    finality::finalise(hub, machine, stx, dependencies, certificates).await
}

/// Close out a flow attempt: log it and move the machine to `Failed` on
/// error.
pub(crate) fn finish(
    machine: &mut SignatureCollection,
    result: Result<CommittedTransaction, FlowError>,
) -> Result<CommittedTransaction, FlowError> {
    match &result {
        Ok(committed) => info!(
            flow_id = %machine.flow_id(),
            flow = %machine.flow(),
            tx_id = %committed.id(),
            sequence = committed.sequence,
            "flow committed"
        ),
        Err(e) => {
            warn!(
                flow_id = %machine.flow_id(),
                flow = %machine.flow(),
                error = %e,
                "flow failed"
            );
            if machine.state().map_or(true, |s| !s.is_terminal()) {
                let _ = machine.fail(e.to_string());
            }
        }
    }
    result
}

/// Keep the first of each transaction.
pub(crate) fn dedup_transactions(txs: &mut Vec<CommittedTransaction>) {
    let mut seen = std::collections::HashSet::new();
    txs.retain(|tx| seen.insert(tx.id()));
}
