//! Countersignature collection.

use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::progress::SignatureCollection;
use super::FlowError;
use crate::crypto::{PublicKey, SecureHash};
use crate::identity::{IdentityCertificate, IdentityError, Party};
use crate::network::{Message, NetworkError, ProposalEnvelope, Response, SignatureResponse};
use crate::node::ServiceHub;
use crate::transaction::{CommittedTransaction, SignedTransaction, TransactionSignature};

/// Ask every counterparty behind a missing signer key to sign `stx`.
///
/// Missing keys are grouped by the well-known party they resolve to, and
/// each party gets one proposal. All requests run concurrently; the first
/// rejection, bad signature, or transport failure aborts the collection
/// and returns without a partially signed transaction.
pub async fn collect_signatures(
    hub: &ServiceHub,
    machine: &mut SignatureCollection,
    mut stx: SignedTransaction,
    dependencies: &[CommittedTransaction],
    certificates: &[IdentityCertificate],
) -> Result<SignedTransaction, FlowError> {
    let by_party = group_by_party(hub, &stx.missing_signers())?;
    if by_party.is_empty() {
        machine.fully_signed()?;
        return Ok(stx);
    }
    machine.await_signatures(by_party.len())?;

    let id = stx.id();
    let envelope = ProposalEnvelope {
        flow_id: machine.flow_id(),
        stx: stx.clone(),
        dependencies: dependencies.to_vec(),
        certificates: certificates.to_vec(),
    };

    let requests = by_party.into_values().map(|(party, keys)| {
        let session = hub.session(&party);
        let message = Message::ProposeTransaction(envelope.clone());
        async move {
            let response = session.send_and_receive(message).await?;
            let sigs = accept_signatures(&party, &keys, response, &id)?;
            debug!(tx_id = %id, party = %party, count = sigs.len(), "signatures received");
            Ok::<_, FlowError>(sigs)
        }
    });
    for sigs in try_join_all(requests).await? {
        stx.add_signatures(sigs);
    }

    stx.verify_required_signatures()?;
    machine.fully_signed()?;
    Ok(stx)
}

fn group_by_party(
    hub: &ServiceHub,
    missing: &BTreeSet<PublicKey>,
) -> Result<BTreeMap<String, (Party, BTreeSet<PublicKey>)>, FlowError> {
    let mut by_party: BTreeMap<String, (Party, BTreeSet<PublicKey>)> = BTreeMap::new();
    for key in missing {
        let party = hub
            .identities()
            .party_from_key(key)
            .ok_or_else(|| IdentityError::UnknownIdentity {
                identity: key.to_base58(),
            })?;
        if &party == hub.me() {
            return Err(IdentityError::KeyNotHeld {
                key: key.to_base58(),
            }
            .into());
        }
        by_party
            .entry(party.name().to_string())
            .or_insert_with(|| (party, BTreeSet::new()))
            .1
            .insert(*key);
    }
    Ok(by_party)
}

fn accept_signatures(
    party: &Party,
    requested: &BTreeSet<PublicKey>,
    response: Response,
    id: &SecureHash,
) -> Result<Vec<TransactionSignature>, FlowError> {
    let sigs = match response {
        Response::Signatures(SignatureResponse::Signed(sigs)) => sigs,
        Response::Signatures(SignatureResponse::Rejected { reason }) | Response::Error(reason) => {
            warn!(tx_id = %id, party = %party, %reason, "counterparty rejected proposal");
            return Err(FlowError::Rejected {
                party: party.name().to_string(),
                reason,
            });
        }
        other => {
            return Err(NetworkError::UnexpectedResponse {
                party: party.name().to_string(),
                got: other.kind(),
            }
            .into())
        }
    };

    for sig in &sigs {
        if !requested.contains(&sig.by) {
            return Err(FlowError::Rejected {
                party: party.name().to_string(),
                reason: format!("signature by unrequested key {}", sig.by),
            });
        }
        if !sig.verify(id) {
            return Err(FlowError::Rejected {
                party: party.name().to_string(),
                reason: format!("invalid signature by {}", sig.by),
            });
        }
    }
    Ok(sigs)
}
