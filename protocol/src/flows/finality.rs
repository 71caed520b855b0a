//! Notarisation and distribution.
//!
//! Once the gateway has committed a transaction nothing can undo it, so
//! distribution failures after that point are logged and do not fail the
//! flow.

use futures::future::join_all;
use std::collections::BTreeMap;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::progress::SignatureCollection;
use super::FlowError;
use crate::identity::{IdentityCertificate, Party};
use crate::network::{Message, RecordEnvelope, Response};
use crate::node::ServiceHub;
use crate::notary::GatewayError;
use crate::transaction::{CommittedTransaction, SignedTransaction, WireTransaction};

/// Submit `stx` to the gateway, record the result locally, then send it to
/// every other participant and signer.
pub async fn finalise(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    stx: SignedTransaction,
    dependencies: Vec<CommittedTransaction>,
    certificates: Vec<IdentityCertificate>,
) -> Result<CommittedTransaction, FlowError> {
    let id = stx.id();
    let limit = hub.config().finality_timeout();
    let submitted = timeout(limit, hub.gateway().submit(stx)).await;
    let committed = match submitted {
        Ok(Ok(committed)) => committed,
        Ok(Err(GatewayError::Conflict { consumed })) => {
            warn!(tx_id = %id, consumed = consumed.len(), "gateway reported a double spend");
            return Err(FlowError::Conflict { consumed });
        }
        Ok(Err(e)) => return Err(FlowError::Notary(e.to_string())),
        Err(_) => {
            warn!(tx_id = %id, after_ms = limit.as_millis() as u64, "gateway timed out");
            return Err(FlowError::Notary(format!(
                "no answer within {} ms",
                limit.as_millis()
            )));
        }
    };
    committed.verify_notarisation()?;
    machine.committed(committed.sequence)?;

    let summary = hub
        .vault()
        .record_transaction(&committed, |p| hub.keys().owns(&p.owning_key()))?;
    info!(
        tx_id = %id,
        sequence = committed.sequence,
        produced = summary.produced.len(),
        consumed = summary.consumed.len(),
        "transaction committed"
    );

    distribute(hub, &committed, dependencies, certificates).await;
    Ok(committed)
}

async fn distribute(
    hub: &ServiceHub,
    committed: &CommittedTransaction,
    dependencies: Vec<CommittedTransaction>,
    certificates: Vec<IdentityCertificate>,
) {
    let recipients = recipients(hub, &committed.stx.tx);
    if recipients.is_empty() {
        return;
    }
    let envelope = RecordEnvelope {
        committed: committed.clone(),
        dependencies,
        certificates,
    };
    let sends = recipients.iter().map(|party| {
        let session = hub.session(party);
        let message = Message::RecordTransaction(envelope.clone());
        async move { (party, session.send_and_receive(message).await) }
    });
    for (party, outcome) in join_all(sends).await {
        match outcome {
            Ok(Response::Ack) => debug!(tx_id = %committed.id(), party = %party, "recorded"),
            Ok(other) => warn!(
                tx_id = %committed.id(),
                party = %party,
                got = other.kind(),
                "recipient did not record transaction"
            ),
            Err(e) => warn!(
                tx_id = %committed.id(),
                party = %party,
                error = %e,
                "could not deliver committed transaction"
            ),
        }
    }
}

/// Output owners and required signers, as well-known parties, minus us.
fn recipients(hub: &ServiceHub, wtx: &WireTransaction) -> Vec<Party> {
    let keys = wtx
        .outputs
        .iter()
        .map(|o| o.owner().owning_key())
        .chain(wtx.required_signers().iter().copied());
    let mut parties: BTreeMap<String, Party> = BTreeMap::new();
    for key in keys {
        if hub.keys().owns(&key) {
            continue;
        }
        match hub.identities().party_from_key(&key) {
            Some(party) if &party != hub.me() => {
                parties.entry(party.name().to_string()).or_insert(party);
            }
            Some(_) => {}
            None => warn!(key = %key, "cannot resolve recipient of committed transaction"),
        }
    }
    parties.into_values().collect()
}
