//! Take cash off the ledger.

use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

use super::progress::{FlowKind, SignatureCollection};
use super::{complete, dedup_transactions, finish, FlowError};
use crate::contract::CashCommand;
use crate::crypto::PublicKey;
use crate::node::ServiceHub;
use crate::state::StateRef;
use crate::transaction::{CommittedTransaction, TransactionBuilder};

/// Exit the records at `refs`. Every exit key (issuer and owner) of every
/// input signs, and we must be the issuer or owner of each one.
///
/// The inputs are named by the caller, so a gateway conflict is returned
/// as is: there is no other record to fall back to.
pub async fn exit(
    hub: &ServiceHub,
    flow_id: Uuid,
    refs: Vec<StateRef>,
) -> Result<CommittedTransaction, FlowError> {
    let mut machine =
        SignatureCollection::initiator(flow_id, FlowKind::Exit, hub.progress().clone());
    info!(flow_id = %machine.flow_id(), inputs = refs.len(), "exit started");
    let result = run(hub, &mut machine, &refs).await;
    finish(&mut machine, result)
}

async fn run(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    refs: &[StateRef],
) -> Result<CommittedTransaction, FlowError> {
    if refs.is_empty() {
        return Err(FlowError::InvalidRequest("nothing to exit".to_string()));
    }

    let mut inputs = Vec::with_capacity(refs.len());
    let mut dependencies = Vec::new();
    let mut signers: BTreeSet<PublicKey> = BTreeSet::new();
    for reference in refs {
        let state = hub
            .vault()
            .load_state(reference)?
            .ok_or_else(|| FlowError::InvalidRequest(format!("unknown state {reference}")))?;
        if hub.vault().is_consumed(reference)? {
            return Err(FlowError::InvalidRequest(format!(
                "state {reference} is already consumed"
            )));
        }
        let cash = state.data();
        if !hub.is_us(cash.issuer()) && !hub.is_us(cash.owner()) {
            return Err(FlowError::InvalidRequest(format!(
                "neither issuer nor owner of {reference}"
            )));
        }
        signers.extend(cash.exit_keys());
        if let Some(dep) = hub.vault().get_transaction(&reference.tx_id)? {
            dependencies.push(dep);
        }
        inputs.push(state);
    }
    dedup_transactions(&mut dependencies);

    let builder = TransactionBuilder::new(hub.notary().clone())
        .add_inputs(inputs)
        .command(CashCommand::Exit)
        .add_signers(signers);
    complete(hub, machine, builder, dependencies).await
}
