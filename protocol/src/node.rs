//! # Party Node
//!
//! [`MyCashNode`] is one party's runtime: its keys, its view of who is who,
//! its vault, and a responder task answering everyone else's flows.
//!
//! ```text
//! start() -> [responder running] -> stop()
//! ```
//!
//! The services a flow needs are bundled in a [`ServiceHub`], shared
//! between the node's own flows and its responder task. Keys, certificates
//! and records all live in the vault's [`LedgerDb`], so a node restarted
//! over the same database can still spend what it held.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ProtocolConfig, PROGRESS_CHANNEL_CAPACITY};
use crate::contract::{Contract, MyCashContract};
use crate::crypto::PartyKeypair;
use crate::flows::{self, FlowApprovals, FlowError, Holding, MyCashData, ProgressEvent};
use crate::identity::{
    AbstractParty, IdentityError, IdentityResolver, IdentityService, KeyManagementService, Party,
};
use crate::network::{InboundRequest, Network, Session};
use crate::notary::FinalizationGateway;
use crate::state::StateRef;
use crate::storage::{DbResult, LedgerDb};
use crate::transaction::CommittedTransaction;
use crate::vault::{Balance, CashQuery, Vault};

/// Everything a flow or responder touches.
pub struct ServiceHub {
    keys: KeyManagementService,
    identities: IdentityService,
    approvals: FlowApprovals,
    vault: Vault,
    network: Network,
    gateway: Arc<dyn FinalizationGateway>,
    contract: Arc<dyn Contract>,
    config: ProtocolConfig,
    progress: broadcast::Sender<ProgressEvent>,
}

impl ServiceHub {
    pub fn new(
        keys: KeyManagementService,
        vault: Vault,
        network: Network,
        gateway: Arc<dyn FinalizationGateway>,
        contract: Arc<dyn Contract>,
        config: ProtocolConfig,
    ) -> Result<Self, IdentityError> {
        let identities = IdentityService::open(vault.db().clone())?;
        identities.register_party(keys.identity().clone());
        identities.register_party(gateway.identity().clone());
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Ok(Self {
            keys,
            identities,
            approvals: FlowApprovals::new(),
            vault,
            network,
            gateway,
            contract,
            config,
            progress,
        })
    }

    pub fn me(&self) -> &Party {
        self.keys.identity()
    }

    pub fn keys(&self) -> &KeyManagementService {
        &self.keys
    }

    pub fn identities(&self) -> &IdentityService {
        &self.identities
    }

    /// Flows other parties may run against our cash.
    pub fn approvals(&self) -> &FlowApprovals {
        &self.approvals
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn gateway(&self) -> &dyn FinalizationGateway {
        self.gateway.as_ref()
    }

    pub fn notary(&self) -> &Party {
        self.gateway.identity()
    }

    pub fn contract(&self) -> &dyn Contract {
        self.contract.as_ref()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn progress(&self) -> &broadcast::Sender<ProgressEvent> {
        &self.progress
    }

    /// True when `party` is us, under our well-known key, a confidential
    /// key we hold, or a certificate that resolves to us.
    pub fn is_us(&self, party: &AbstractParty) -> bool {
        self.keys.owns(&party.owning_key())
            || self
                .identities
                .well_known_party_from_anonymous(party)
                .map_or(false, |p| &p == self.me())
    }

    pub fn session(&self, counterparty: &Party) -> Session {
        self.network
            .session(self.me(), counterparty, self.config.response_timeout())
    }
}

/// One party on the network.
pub struct MyCashNode {
    hub: Arc<ServiceHub>,
    responder: JoinHandle<()>,
}

impl MyCashNode {
    /// Start a node with an in-memory vault and the standard contract.
    pub fn start(
        name: impl Into<String>,
        keypair: PartyKeypair,
        network: Network,
        gateway: Arc<dyn FinalizationGateway>,
        config: ProtocolConfig,
    ) -> Result<Self, IdentityError> {
        let db = LedgerDb::open_temporary()?;
        let keys = KeyManagementService::open(name, keypair, db.clone())?;
        Self::start_with(
            keys,
            Vault::new(db),
            network,
            gateway,
            Arc::new(MyCashContract),
            config,
        )
    }

    /// Register on `network` and spawn the responder task. Must be called
    /// inside a tokio runtime.
    pub fn start_with(
        keys: KeyManagementService,
        vault: Vault,
        network: Network,
        gateway: Arc<dyn FinalizationGateway>,
        contract: Arc<dyn Contract>,
        config: ProtocolConfig,
    ) -> Result<Self, IdentityError> {
        let inbox_capacity = config.inbox_capacity;
        let hub = Arc::new(ServiceHub::new(keys, vault, network, gateway, contract, config)?);
        let inbox = hub.network().register(hub.me(), inbox_capacity);
        let responder = tokio::spawn(respond_forever(Arc::clone(&hub), inbox));
        info!(party = %hub.me(), "node started");
        Ok(Self { hub, responder })
    }

    pub fn identity(&self) -> &Party {
        self.hub.me()
    }

    pub fn hub(&self) -> &Arc<ServiceHub> {
        &self.hub
    }

    pub fn vault(&self) -> &Vault {
        self.hub.vault()
    }

    /// Add a network map entry.
    pub fn register_party(&self, party: &Party) {
        self.hub.identities().register_party(party.clone());
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.hub.progress().subscribe()
    }

    /// Let `initiator` spend our cash, or mint cash we issue, in flow
    /// `flow_id`.
    pub fn approve(&self, flow_id: Uuid, initiator: &Party) {
        self.hub.approvals().approve(flow_id, initiator.clone());
    }

    pub fn revoke_approval(&self, flow_id: &Uuid) -> bool {
        self.hub.approvals().revoke(flow_id)
    }

    pub async fn issue(
        &self,
        data: Vec<MyCashData>,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        self.issue_with_id(Uuid::new_v4(), data, anonymous).await
    }

    /// Issue under a flow id agreed beforehand, so an issuer that is not us
    /// can approve it.
    pub async fn issue_with_id(
        &self,
        flow_id: Uuid,
        data: Vec<MyCashData>,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        flows::issue::issue(&self.hub, flow_id, data, anonymous).await
    }

    pub async fn move_cash(
        &self,
        data: Vec<MyCashData>,
        new_owner: &Party,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        self.move_cash_with_id(Uuid::new_v4(), data, new_owner, anonymous).await
    }

    pub async fn move_cash_with_id(
        &self,
        flow_id: Uuid,
        data: Vec<MyCashData>,
        new_owner: &Party,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        flows::move_cash::move_cash(&self.hub, flow_id, data, new_owner, anonymous).await
    }

    pub async fn exit(&self, refs: Vec<StateRef>) -> Result<CommittedTransaction, FlowError> {
        self.exit_with_id(Uuid::new_v4(), refs).await
    }

    pub async fn exit_with_id(
        &self,
        flow_id: Uuid,
        refs: Vec<StateRef>,
    ) -> Result<CommittedTransaction, FlowError> {
        flows::exit::exit(&self.hub, flow_id, refs).await
    }

    /// Our unspent records with every identity resolved.
    pub fn known_holdings(&self, query: &CashQuery) -> Result<Vec<Holding>, FlowError> {
        flows::anonymize::known_holdings(&self.hub, query)
    }

    pub fn balances(&self) -> DbResult<Vec<Balance>> {
        self.hub.vault().balances()
    }

    /// Take the node off the network and stop answering.
    pub fn stop(self) {
        self.hub.network().deregister(self.hub.me().name());
        self.responder.abort();
        info!(party = %self.hub.me(), "node stopped");
    }
}

async fn respond_forever(
    hub: Arc<ServiceHub>,
    mut inbox: tokio::sync::mpsc::Receiver<InboundRequest>,
) {
    while let Some(request) = inbox.recv().await {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let response =
                flows::responder::handle_request(&hub, &request.from, &request.message);
            request.respond(response);
        });
    }
    debug!(party = %hub.me(), "inbox closed");
}
