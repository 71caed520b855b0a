//! Move cash to a new owner.
//!
//! Requests are consolidated per (owner, issuer, currency) and grouped per
//! owner. Our own cash is selected from our vault; anyone else's is
//! selected by their node in answer to a `SelectCash` query, and they sign
//! for their inputs like any other counterparty. Both the query and the
//! signature need that owner to have approved the flow id for us.

use std::collections::{BTreeSet, HashSet};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::anonymize::{confidential_for, share_identity};
use super::progress::{FlowKind, SignatureCollection};
use super::{complete, dedup_transactions, finish, FlowError, MyCashData};
use crate::contract::CashCommand;
use crate::crypto::PublicKey;
use crate::identity::{AbstractParty, ConfidentialIdentities, IdentityResolver, Party};
use crate::network::{Message, NetworkError, QueryResponse, Response, SelectionQuery};
use crate::node::ServiceHub;
use crate::state::{MyCash, StateAndRef, StateRef};
use crate::transaction::{CommittedTransaction, ResolutionError, TransactionBuilder};
use crate::vault::{consolidate, CashSelector, MoveRequest, SelectionError};

/// Inputs, change and backing transactions gathered for one attempt.
#[derive(Default)]
struct Gathered {
    inputs: Vec<StateAndRef>,
    change: Vec<MyCash>,
    dependencies: Vec<CommittedTransaction>,
}

/// Move every amount in `data` to `new_owner`.
///
/// On a gateway conflict the whole proposal is rebuilt, with the reported
/// refs excluded from selection, up to the configured retry limit. Every
/// attempt runs under the same `flow_id`.
pub async fn move_cash(
    hub: &ServiceHub,
    flow_id: Uuid,
    data: Vec<MyCashData>,
    new_owner: &Party,
    anonymous: bool,
) -> Result<CommittedTransaction, FlowError> {
    info!(
        flow_id = %flow_id,
        requests = data.len(),
        new_owner = %new_owner,
        anonymous,
        "move started"
    );
    let max_retries = hub.config().max_conflict_retries;
    let mut exclude: HashSet<StateRef> = HashSet::new();
    let mut attempt = 0u32;
    loop {
        let mut machine =
            SignatureCollection::initiator(flow_id, FlowKind::Move, hub.progress().clone());
        let result = run(hub, &mut machine, &data, new_owner, anonymous, &exclude).await;
        match result {
            Err(FlowError::Conflict { consumed }) if attempt < max_retries => {
                attempt += 1;
                let backoff = hub.config().retry_backoff(attempt);
                warn!(
                    flow_id = %flow_id,
                    attempt,
                    consumed = consumed.len(),
                    backoff_ms = backoff.as_millis() as u64,
                    "inputs spent concurrently, reselecting"
                );
                let _ = machine.fail(format!("{} inputs already consumed", consumed.len()));
                exclude.extend(consumed);
                sleep(backoff).await;
            }
            other => return finish(&mut machine, other),
        }
    }
}

async fn run(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    data: &[MyCashData],
    new_owner: &Party,
    anonymous: bool,
    exclude: &HashSet<StateRef>,
) -> Result<CommittedTransaction, FlowError> {
    if data.is_empty() {
        return Err(FlowError::InvalidRequest("nothing to move".to_string()));
    }
    let requests: Vec<MoveRequest> = data
        .iter()
        .map(|d| MoveRequest::new(&d.owner, &d.issuer, d.amount, d.currency.clone()))
        .collect();
    let requests = consolidate(&requests)?;

    let mut gathered = Gathered::default();
    for (owner, owned) in group_by_owner(&requests)? {
        if &owner == hub.me() {
            let selector = CashSelector::new(hub.vault(), hub.identities());
            for (_, selection) in selector.select_all(&owned, exclude)? {
                gathered.inputs.extend(selection.inputs);
                gathered.change.extend(selection.change);
            }
        } else {
            let flow_id = machine.flow_id();
            delegate_selection(hub, flow_id, &owner, owned, exclude, &mut gathered).await?;
        }
    }
    attach_local_dependencies(hub, &mut gathered)?;

    let mut cache = ConfidentialIdentities::new();
    let recipient: AbstractParty = if anonymous {
        confidential_for(hub, &mut cache, new_owner).await?.into()
    } else {
        new_owner.into()
    };

    let mut outputs = Vec::with_capacity(requests.len() + gathered.change.len());
    for request in &requests {
        let issuer = present_as(hub, &mut cache, &request.issuer, anonymous).await?;
        share_identity(hub, &issuer, new_owner).await?;
        outputs.push(MyCash::new(
            issuer,
            recipient.clone(),
            request.amount.quantity,
            request.amount.currency.clone(),
        )?);
    }
    for change in &gathered.change {
        let owner_party = hub.identities().require_well_known(change.owner())?;
        let issuer = present_as(hub, &mut cache, change.issuer(), anonymous).await?;
        let owner = present_as(hub, &mut cache, change.owner(), anonymous).await?;
        share_identity(hub, &issuer, &owner_party).await?;
        outputs.push(change.with_parties(issuer, owner));
    }

    let mut signers: BTreeSet<PublicKey> = gathered
        .inputs
        .iter()
        .map(|i| i.data().owner().owning_key())
        .collect();
    signers.insert(recipient.owning_key());
    debug!(
        flow_id = %machine.flow_id(),
        inputs = gathered.inputs.len(),
        outputs = outputs.len(),
        signers = signers.len(),
        "move assembled"
    );

    let builder = TransactionBuilder::new(hub.notary().clone())
        .add_inputs(gathered.inputs)
        .add_outputs(outputs)
        .command(CashCommand::Move)
        .add_signers(signers);
    complete(hub, machine, builder, gathered.dependencies).await
}

/// Consolidated requests per owner, in first-seen order.
fn group_by_owner(
    requests: &[MoveRequest],
) -> Result<Vec<(Party, Vec<MoveRequest>)>, FlowError> {
    let mut groups: Vec<(Party, Vec<MoveRequest>)> = Vec::new();
    for request in requests {
        let owner = request.owner.as_well_known().cloned().ok_or_else(|| {
            FlowError::InvalidRequest(format!(
                "owner {} must be a well-known party",
                request.owner
            ))
        })?;
        match groups.iter_mut().find(|(o, _)| *o == owner) {
            Some((_, owned)) => owned.push(request.clone()),
            None => groups.push((owner, vec![request.clone()])),
        }
    }
    Ok(groups)
}

async fn delegate_selection(
    hub: &ServiceHub,
    flow_id: Uuid,
    owner: &Party,
    requests: Vec<MoveRequest>,
    exclude: &HashSet<StateRef>,
    gathered: &mut Gathered,
) -> Result<(), FlowError> {
    let query = SelectionQuery {
        flow_id,
        requests,
        exclude: exclude.iter().copied().collect(),
    };
    let response = hub
        .session(owner)
        .send_and_receive(Message::SelectCash(query))
        .await?;
    match response {
        Response::Selection(QueryResponse::Selected {
            inputs,
            change,
            dependencies,
            certificates,
        }) => {
            for cert in certificates {
                hub.identities().verify_and_register(cert)?;
            }
            for dep in &dependencies {
                dep.verify()?;
            }
            if let Some(stray) = inputs.iter().find(|i| {
                !hub
                    .identities()
                    .is_same_party(i.data().owner(), &AbstractParty::from(owner))
            }) {
                return Err(FlowError::InvalidRequest(format!(
                    "{} offered {} which it does not own",
                    owner, stray.reference
                )));
            }
            debug!(
                flow_id = %flow_id,
                party = %owner,
                inputs = inputs.len(),
                "counterparty selected cash"
            );
            gathered.inputs.extend(inputs);
            gathered.change.extend(change);
            gathered.dependencies.extend(dependencies);
            Ok(())
        }
        Response::Selection(QueryResponse::Insufficient {
            currency,
            requested,
            available,
            shortfall,
        }) => Err(SelectionError::InsufficientFunds {
            currency,
            requested,
            available,
            shortfall,
        }
        .into()),
        Response::Error(reason) => Err(FlowError::Rejected {
            party: owner.name().to_string(),
            reason,
        }),
        other => Err(NetworkError::UnexpectedResponse {
            party: owner.name().to_string(),
            got: other.kind(),
        }
        .into()),
    }
}

/// Backing transactions for inputs that came from our own vault.
fn attach_local_dependencies(hub: &ServiceHub, gathered: &mut Gathered) -> Result<(), FlowError> {
    for input in &gathered.inputs {
        let tx_id = input.reference.tx_id;
        if gathered.dependencies.iter().any(|d| d.id() == tx_id) {
            continue;
        }
        let dep = hub
            .vault()
            .get_transaction(&tx_id)?
            .ok_or(ResolutionError::MissingInput {
                reference: input.reference,
            })?;
        gathered.dependencies.push(dep);
    }
    dedup_transactions(&mut gathered.dependencies);
    Ok(())
}

/// `party` as it should appear in an output: unchanged, or swapped for a
/// confidential identity of the well-known party behind it.
async fn present_as(
    hub: &ServiceHub,
    cache: &mut ConfidentialIdentities,
    party: &AbstractParty,
    anonymous: bool,
) -> Result<AbstractParty, FlowError> {
    if !anonymous {
        return Ok(party.clone());
    }
    let known = hub.identities().require_well_known(party)?;
    Ok(confidential_for(hub, cache, &known).await?.into())
}
