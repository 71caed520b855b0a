//! Confidential identities inside a flow.
//!
//! [`confidential_for`] is the one entry point: it returns the identity a
//! party should appear under in this transaction, swapping certificates
//! with the counterparty the first time and reusing the cached answer
//! after that.

use tracing::debug;

use super::{FlowError, Holding, MyCashData};
use crate::identity::{
    AbstractParty, AnonymousParty, ConfidentialIdentities, IdentityCertificate, IdentityError,
    IdentityResolver, Party,
};
use crate::network::{Message, NetworkError, Response};
use crate::node::ServiceHub;
use crate::vault::CashQuery;

/// The confidential identity `party` uses in this flow.
pub async fn confidential_for(
    hub: &ServiceHub,
    cache: &mut ConfidentialIdentities,
    party: &Party,
) -> Result<AnonymousParty, FlowError> {
    if party == hub.me() {
        return our_confidential(hub, cache).map(|(anonymous, _)| anonymous);
    }
    swap_identities(hub, cache, party).await
}

/// Exchange fresh confidential certificates with `counterparty`.
pub async fn swap_identities(
    hub: &ServiceHub,
    cache: &mut ConfidentialIdentities,
    counterparty: &Party,
) -> Result<AnonymousParty, FlowError> {
    if let Some(known) = cache.get(counterparty) {
        return Ok(known);
    }
    let (_, ours) = our_confidential(hub, cache)?;
    let response = hub
        .session(counterparty)
        .send_and_receive(Message::SwapIdentities(ours))
        .await?;
    let theirs = match response {
        Response::Identity(cert) => cert,
        Response::Error(reason) => {
            return Err(NetworkError::Remote {
                party: counterparty.name().to_string(),
                reason,
            }
            .into())
        }
        other => {
            return Err(NetworkError::UnexpectedResponse {
                party: counterparty.name().to_string(),
                got: other.kind(),
            }
            .into())
        }
    };
    if theirs.well_known() != counterparty {
        return Err(IdentityError::InvalidCertificate {
            key: theirs.anonymous().owning_key().to_base58(),
        }
        .into());
    }
    let anonymous = theirs.anonymous();
    hub.identities().verify_and_register(theirs)?;
    cache.insert(counterparty, anonymous);
    debug!(party = %counterparty, anonymous = %anonymous, "swapped identities");
    Ok(anonymous)
}

/// Tell `recipient` who is behind `issuer`, so it can resolve the issuer
/// of cash it is about to hold.
pub async fn share_identity(
    hub: &ServiceHub,
    issuer: &AbstractParty,
    recipient: &Party,
) -> Result<(), FlowError> {
    if recipient == hub.me() || !issuer.is_anonymous() {
        return Ok(());
    }
    let cert = hub
        .identities()
        .certificate_for(&issuer.owning_key())
        .ok_or_else(|| IdentityError::UnknownIdentity {
            identity: issuer.to_string(),
        })?;
    register_identity_with(hub, recipient, cert).await
}

pub async fn register_identity_with(
    hub: &ServiceHub,
    recipient: &Party,
    cert: IdentityCertificate,
) -> Result<(), FlowError> {
    match hub
        .session(recipient)
        .send_and_receive(Message::RegisterIdentity(cert))
        .await?
    {
        Response::Ack => Ok(()),
        Response::Error(reason) => Err(NetworkError::Remote {
            party: recipient.name().to_string(),
            reason,
        }
        .into()),
        other => Err(NetworkError::UnexpectedResponse {
            party: recipient.name().to_string(),
            got: other.kind(),
        }
        .into()),
    }
}

/// Our confidential identity for this flow, generated on first use.
fn our_confidential(
    hub: &ServiceHub,
    cache: &mut ConfidentialIdentities,
) -> Result<(AnonymousParty, IdentityCertificate), FlowError> {
    if let Some((anonymous, cert)) = cache.me() {
        return Ok((*anonymous, cert.clone()));
    }
    let (anonymous, cert) = hub.keys().fresh_confidential_identity()?;
    hub.identities().verify_and_register(cert.clone())?;
    cache.set_me(anonymous, cert.clone());
    Ok((anonymous, cert))
}

/// Unspent records matching `query`, with every identity resolved.
///
/// # Errors
///
/// [`IdentityError::UnknownIdentity`] if any record names a confidential
/// identity this node cannot resolve.
pub fn known_holdings(hub: &ServiceHub, query: &CashQuery) -> Result<Vec<Holding>, FlowError> {
    let identities = hub.identities();
    hub.vault()
        .query_unspent_resolved(query, identities)?
        .into_iter()
        .map(|state| -> Result<Holding, FlowError> {
            let cash = state.data();
            Ok(Holding {
                reference: state.reference,
                data: MyCashData {
                    issuer: identities.require_well_known(cash.issuer())?,
                    owner: identities.require_well_known(cash.owner())?,
                    amount: cash.amount(),
                    currency: cash.currency().clone(),
                },
            })
        })
        .collect()
}
