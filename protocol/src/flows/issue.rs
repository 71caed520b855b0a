//! Bring new cash onto the ledger.

use std::collections::{BTreeSet, HashSet};
use tracing::info;
use uuid::Uuid;

use super::anonymize::{confidential_for, share_identity};
use super::progress::{FlowKind, SignatureCollection};
use super::{complete, finish, FlowError, MyCashData};
use crate::contract::{CashCommand, ContractError};
use crate::crypto::PublicKey;
use crate::identity::{AbstractParty, ConfidentialIdentities};
use crate::node::ServiceHub;
use crate::state::MyCash;
use crate::transaction::{CommittedTransaction, TransactionBuilder};

/// Issue one output per entry of `data` under flow `flow_id`.
///
/// Issuers need not be us: a node may propose an issuance on behalf of
/// another issuer, which signs only if it approved `flow_id` for us. Every
/// issuer and every owner is a required signer.
pub async fn issue(
    hub: &ServiceHub,
    flow_id: Uuid,
    data: Vec<MyCashData>,
    anonymous: bool,
) -> Result<CommittedTransaction, FlowError> {
    let mut machine =
        SignatureCollection::initiator(flow_id, FlowKind::Issue, hub.progress().clone());
    info!(
        flow_id = %machine.flow_id(),
        outputs = data.len(),
        anonymous,
        "issue started"
    );
    let result = run(hub, &mut machine, &data, anonymous).await;
    finish(&mut machine, result)
}

async fn run(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    data: &[MyCashData],
    anonymous: bool,
) -> Result<CommittedTransaction, FlowError> {
    if data.is_empty() {
        return Err(FlowError::InvalidRequest("nothing to issue".to_string()));
    }
    // Checked before any identity swap.
    if let Some(item) = data.iter().find(|d| d.issuer == d.owner) {
        return Err(ContractError::SelfIssue {
            party: item.issuer.name().to_string(),
        }
        .into());
    }

    let mut cache = ConfidentialIdentities::new();
    let mut shared: HashSet<(PublicKey, String)> = HashSet::new();
    let mut outputs = Vec::with_capacity(data.len());
    let mut signers: BTreeSet<PublicKey> = BTreeSet::new();

    for item in data {
        let (issuer, owner): (AbstractParty, AbstractParty) = if anonymous {
            let issuer = confidential_for(hub, &mut cache, &item.issuer).await?;
            let owner = confidential_for(hub, &mut cache, &item.owner).await?;
            (issuer.into(), owner.into())
        } else {
            (item.issuer.clone().into(), item.owner.clone().into())
        };
        if anonymous && shared.insert((issuer.owning_key(), item.owner.name().to_string())) {
            share_identity(hub, &issuer, &item.owner).await?;
        }
        let output = MyCash::new(issuer, owner, item.amount, item.currency.clone())?;
        signers.insert(output.issuer().owning_key());
        signers.insert(output.owner().owning_key());
        outputs.push(output);
    }

    let builder = TransactionBuilder::new(hub.notary().clone())
        .add_outputs(outputs)
        .command(CashCommand::Issue)
        .add_signers(signers);
    complete(hub, machine, builder, Vec::new()).await
}
