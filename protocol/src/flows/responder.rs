//! The counterparty side of every flow.
//!
//! [`handle_request`] answers one inbound message. A proposal is never
//! signed on the initiator's word: the responder resolves the inputs
//! itself, re-runs the contract, and checks it actually has a stake in the
//! transaction before signing anything. Spending our cash, or minting cash
//! we issue, additionally needs an operator approval for the initiator's
//! flow (see [`FlowApprovals`](super::FlowApprovals)).

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::progress::SignatureCollection;
use super::FlowError;
use crate::contract::CashCommand;
use crate::crypto::{PublicKey, SecureHash};
use crate::identity::{AbstractParty, IdentityCertificate, IdentityResolver, Party};
use crate::network::{
    Message, ProposalEnvelope, QueryResponse, RecordEnvelope, Response, SelectionQuery,
    SignatureResponse,
};
use crate::node::ServiceHub;
use crate::state::{StateAndRef, StateRef};
use crate::transaction::{
    CommittedTransaction, LedgerTransaction, ResolutionError, TransactionSignature,
    WireTransaction,
};
use crate::vault::{CashSelector, RecordSummary, SelectionError};

pub fn handle_request(hub: &ServiceHub, from: &Party, message: &Message) -> Response {
    debug!(party = %from, kind = message.kind(), "request received");
    match message {
        Message::ProposeTransaction(envelope) => {
            Response::Signatures(sign_proposal(hub, from, envelope))
        }
        Message::SelectCash(query) => match select_for(hub, from, query) {
            Ok(response) => Response::Selection(response),
            Err(e) => {
                warn!(party = %from, error = %e, "selection query failed");
                Response::Error(e.to_string())
            }
        },
        Message::SwapIdentities(theirs) => match swap(hub, from, theirs) {
            Ok(ours) => Response::Identity(ours),
            Err(e) => {
                warn!(party = %from, error = %e, "identity swap refused");
                Response::Error(e.to_string())
            }
        },
        Message::RegisterIdentity(cert) => {
            match hub.identities().verify_and_register(cert.clone()) {
                Ok(()) => Response::Ack,
                Err(e) => {
                    warn!(party = %from, error = %e, "identity registration refused");
                    Response::Error(e.to_string())
                }
            }
        }
        Message::RecordTransaction(envelope) => match record(hub, envelope) {
            Ok(summary) => {
                info!(
                    tx_id = %envelope.committed.id(),
                    party = %from,
                    produced = summary.produced.len(),
                    consumed = summary.consumed.len(),
                    "recorded committed transaction"
                );
                Response::Ack
            }
            Err(e) => {
                warn!(party = %from, error = %e, "refused to record transaction");
                Response::Error(e.to_string())
            }
        },
    }
}

// -- Proposals ----------------------------------------------------------------

fn sign_proposal(
    hub: &ServiceHub,
    from: &Party,
    envelope: &ProposalEnvelope,
) -> SignatureResponse {
    let id = envelope.stx.id();
    let mut machine = SignatureCollection::responder(id, hub.progress().clone());
    match verify_and_sign(hub, from, envelope) {
        Ok(sigs) => {
            if let Err(e) = machine.signed() {
                warn!(tx_id = %id, error = %e, "responder state");
            }
            info!(tx_id = %id, party = %from, signatures = sigs.len(), "signed proposal");
            SignatureResponse::Signed(sigs)
        }
        Err(e) => {
            let reason = e.to_string();
            if let Err(e) = machine.rejected(reason.clone()) {
                warn!(tx_id = %id, error = %e, "responder state");
            }
            warn!(tx_id = %id, party = %from, %reason, "rejected proposal");
            SignatureResponse::Rejected { reason }
        }
    }
}

/// Validate a proposal `from` sent us and sign for every required key we
/// hold.
pub fn verify_and_sign(
    hub: &ServiceHub,
    from: &Party,
    envelope: &ProposalEnvelope,
) -> Result<Vec<TransactionSignature>, FlowError> {
    let stx = &envelope.stx;
    let wtx = &stx.tx;
    if &wtx.notary != hub.notary() {
        return Err(FlowError::InvalidRequest(format!(
            "transaction names unknown notary {}",
            wtx.notary
        )));
    }

    check_dependencies(hub, &envelope.dependencies)?;
    register_certificates(hub, &envelope.certificates)?;
    let ltx = resolve_inputs(hub, wtx, &envelope.dependencies)?;
    hub.contract().verify(&ltx, hub.identities())?;
    check_stakeholder(hub, &ltx)?;
    check_consent(hub, from, envelope.flow_id, &ltx)?;
    stx.verify_signatures_except(&stx.missing_signers())?;

    let ours: BTreeSet<PublicKey> = hub
        .keys()
        .filter_my_keys(wtx.required_signers())
        .into_iter()
        .collect();
    if ours.is_empty() {
        return Err(FlowError::InvalidRequest(
            "none of the required signers is ours".to_string(),
        ));
    }
    let id = stx.id();
    let already = stx.signed_keys();
    ours.difference(&already)
        .map(|key| TransactionSignature::create(hub.keys(), key, &id).map_err(FlowError::from))
        .collect()
}

fn check_dependencies(
    hub: &ServiceHub,
    dependencies: &[CommittedTransaction],
) -> Result<(), FlowError> {
    for dep in dependencies {
        dep.verify()?;
        hub.vault().store_dependency(dep)?;
    }
    Ok(())
}

fn register_certificates(
    hub: &ServiceHub,
    certificates: &[IdentityCertificate],
) -> Result<(), FlowError> {
    for cert in certificates {
        hub.identities().verify_and_register(cert.clone())?;
    }
    Ok(())
}

/// Resolve inputs from the shipped dependencies first, then our own store.
fn resolve_inputs(
    hub: &ServiceHub,
    wtx: &WireTransaction,
    dependencies: &[CommittedTransaction],
) -> Result<LedgerTransaction, FlowError> {
    let shipped: Vec<(SecureHash, &WireTransaction)> =
        dependencies.iter().map(|d| (d.id(), &d.stx.tx)).collect();
    let mut inputs: Vec<StateAndRef> = Vec::with_capacity(wtx.inputs.len());
    for reference in &wtx.inputs {
        let from_deps = shipped
            .iter()
            .find(|(id, _)| *id == reference.tx_id)
            .and_then(|(_, tx)| tx.out_ref(reference));
        let state = match from_deps {
            Some(state) => state,
            None => hub
                .vault()
                .load_state(reference)?
                .ok_or(ResolutionError::MissingInput {
                    reference: *reference,
                })?,
        };
        inputs.push(state);
    }
    Ok(LedgerTransaction::resolve(wtx, inputs)?)
}

fn check_stakeholder(hub: &ServiceHub, ltx: &LedgerTransaction) -> Result<(), FlowError> {
    let command = ltx.command.value;
    let involved = match command {
        CashCommand::Issue => ltx
            .outputs
            .iter()
            .any(|o| hub.is_us(o.issuer()) || hub.is_us(o.owner())),
        CashCommand::Move => {
            ltx.inputs.iter().any(|i| hub.is_us(i.data().owner()))
                || ltx.outputs.iter().any(|o| hub.is_us(o.owner()))
        }
        CashCommand::Exit => ltx
            .inputs
            .iter()
            .any(|i| hub.is_us(i.data().issuer()) || hub.is_us(i.data().owner())),
    };
    if involved {
        Ok(())
    } else {
        Err(FlowError::NotStakeholder { command })
    }
}

/// Receiving cash, taking change and co-signing an owner's exit of cash we
/// issued are always fine. Signing for our inputs, or as issuer of new
/// cash, needs `from` to hold an approval for `flow_id`.
fn check_consent(
    hub: &ServiceHub,
    from: &Party,
    flow_id: Uuid,
    ltx: &LedgerTransaction,
) -> Result<(), FlowError> {
    if hub.approvals().is_approved(&flow_id, from) {
        return Ok(());
    }
    let initiator = AbstractParty::from(from);
    let command = ltx.command.value;
    let needs_approval = match command {
        CashCommand::Issue => ltx.outputs.iter().any(|o| hub.is_us(o.issuer())),
        CashCommand::Move => ltx.inputs.iter().any(|i| hub.is_us(i.data().owner())),
        CashCommand::Exit => ltx.inputs.iter().any(|i| {
            let cash = i.data();
            hub.is_us(cash.owner())
                || (hub.is_us(cash.issuer())
                    && !hub.identities().is_same_party(cash.owner(), &initiator))
        }),
    };
    if needs_approval {
        Err(FlowError::Unauthorised {
            initiator: from.name().to_string(),
            command,
        })
    } else {
        Ok(())
    }
}

// -- Selection queries -------------------------------------------------------

fn select_for(
    hub: &ServiceHub,
    from: &Party,
    query: &SelectionQuery,
) -> Result<QueryResponse, FlowError> {
    if !hub.approvals().is_approved(&query.flow_id, from) {
        return Err(FlowError::Unauthorised {
            initiator: from.name().to_string(),
            command: CashCommand::Move,
        });
    }
    if let Some(foreign) = query.requests.iter().find(|r| !hub.is_us(&r.owner)) {
        return Err(FlowError::InvalidRequest(format!(
            "cannot select cash owned by {}",
            foreign.owner
        )));
    }
    let exclude: HashSet<StateRef> = query.exclude.iter().copied().collect();
    let selector = CashSelector::new(hub.vault(), hub.identities());
    let selections = match selector.select_all(&query.requests, &exclude) {
        Ok(selections) => selections,
        Err(SelectionError::InsufficientFunds {
            currency,
            requested,
            available,
            shortfall,
        }) => {
            return Ok(QueryResponse::Insufficient {
                currency,
                requested,
                available,
                shortfall,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut inputs = Vec::new();
    let mut change = Vec::new();
    for (_, selection) in selections {
        inputs.extend(selection.inputs);
        change.extend(selection.change);
    }
    let mut dependencies = Vec::new();
    for input in &inputs {
        if dependencies
            .iter()
            .any(|d: &CommittedTransaction| d.id() == input.reference.tx_id)
        {
            continue;
        }
        let dep = hub
            .vault()
            .get_transaction(&input.reference.tx_id)?
            .ok_or(ResolutionError::MissingInput {
                reference: input.reference,
            })?;
        dependencies.push(dep);
    }
    let certificates = hub.identities().certificates_for(
        inputs
            .iter()
            .flat_map(|i| [i.data().issuer(), i.data().owner()]),
    );
    debug!(
        flow_id = %query.flow_id,
        inputs = inputs.len(),
        change = change.len(),
        "selected cash for counterparty"
    );
    Ok(QueryResponse::Selected {
        inputs,
        change,
        dependencies,
        certificates,
    })
}

// -- Identities and records ---------------------------------------------------

fn swap(
    hub: &ServiceHub,
    from: &Party,
    theirs: &IdentityCertificate,
) -> Result<IdentityCertificate, FlowError> {
    if theirs.well_known() != from {
        return Err(FlowError::InvalidRequest(format!(
            "certificate names {} but came from {}",
            theirs.well_known(),
            from
        )));
    }
    hub.identities().verify_and_register(theirs.clone())?;
    let (_, ours) = hub.keys().fresh_confidential_identity()?;
    hub.identities().verify_and_register(ours.clone())?;
    Ok(ours)
}

fn record(hub: &ServiceHub, envelope: &RecordEnvelope) -> Result<RecordSummary, FlowError> {
    let committed = &envelope.committed;
    committed.verify()?;
    if &committed.stx.tx.notary != hub.notary() {
        return Err(FlowError::InvalidRequest(format!(
            "transaction notarised by unknown notary {}",
            committed.stx.tx.notary
        )));
    }
    register_certificates(hub, &envelope.certificates)?;
    check_dependencies(hub, &envelope.dependencies)?;
    Ok(hub
        .vault()
        .record_transaction(committed, |p| hub.keys().owns(&p.owning_key()))?)
}
