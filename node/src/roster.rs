//! # Hosted Roster
//!
//! Boots the notary and every configured party on one in-process
//! [`Network`], and runs flows on their behalf with metrics around each
//! call.
//!
//! With a data directory each party gets its own sled database under
//! `<data_dir>/<name>/` and a hex key file `<data_dir>/<name>.key`, so a
//! restarted roster sees the same identities, confidential keys and vault
//! contents.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

use mycash_protocol::contract::MyCashContract;
use mycash_protocol::crypto::PartyKeypair;
use mycash_protocol::flows::{FlowError, FlowKind, MyCashData};
use mycash_protocol::identity::{KeyManagementService, Party};
use mycash_protocol::network::Network;
use mycash_protocol::notary::{FinalizationGateway, SimpleNotary};
use mycash_protocol::state::StateRef;
use mycash_protocol::storage::LedgerDb;
use mycash_protocol::transaction::CommittedTransaction;
use mycash_protocol::vault::Vault;
use mycash_protocol::MyCashNode;

use crate::config::NodeConfig;
use crate::metrics::{self, SharedMetrics};

/// The notary plus one running node per configured party.
pub struct Roster {
    notary: Arc<SimpleNotary>,
    nodes: BTreeMap<String, MyCashNode>,
    metrics: SharedMetrics,
    recorders: Vec<JoinHandle<()>>,
}

impl Roster {
    /// Start every party and introduce them to each other.
    pub fn boot(config: &NodeConfig, metrics: SharedMetrics) -> Result<Self> {
        config.validate()?;
        let network = Network::new();

        let notary_keys = load_or_generate_key(config.data_dir.as_deref(), &config.notary)?;
        let notary_db = open_db(config.data_dir.as_deref(), &config.notary)?;
        let notary = Arc::new(
            SimpleNotary::new(config.notary.clone(), notary_keys, notary_db)
                .context("failed to open notary state")?,
        );
        let gateway: Arc<dyn FinalizationGateway> = notary.clone();

        let mut nodes = BTreeMap::new();
        let mut recorders = Vec::new();
        for name in &config.parties {
            let keypair = load_or_generate_key(config.data_dir.as_deref(), name)?;
            let db = open_db(config.data_dir.as_deref(), name)?;
            let keys = KeyManagementService::open(name.clone(), keypair, db.clone())
                .with_context(|| format!("failed to load keys for {name}"))?;
            let node = MyCashNode::start_with(
                keys,
                Vault::new(db),
                network.clone(),
                Arc::clone(&gateway),
                Arc::new(MyCashContract),
                config.protocol.clone(),
            )
            .with_context(|| format!("failed to start {name}"))?;
            recorders.push(metrics::spawn_progress_recorder(
                Arc::clone(&metrics),
                node.subscribe_progress(),
            ));
            nodes.insert(name.clone(), node);
        }

        let parties: Vec<Party> = nodes.values().map(|n| n.identity().clone()).collect();
        for node in nodes.values() {
            for party in &parties {
                node.register_party(party);
            }
        }
        tracing::info!(
            notary = %config.notary,
            parties = parties.len(),
            persistent = config.data_dir.is_some(),
            "roster booted"
        );

        let roster = Self {
            notary,
            nodes,
            metrics,
            recorders,
        };
        roster.refresh_unspent();
        Ok(roster)
    }

    pub fn notary(&self) -> &Party {
        self.notary.identity()
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node(&self, name: &str) -> Option<&MyCashNode> {
        self.nodes.get(name)
    }

    pub fn party(&self, name: &str) -> Option<Party> {
        self.nodes.get(name).map(|n| n.identity().clone())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MyCashNode> {
        self.nodes.values()
    }

    fn require(&self, name: &str) -> Result<&MyCashNode, FlowError> {
        self.nodes
            .get(name)
            .ok_or_else(|| FlowError::InvalidRequest(format!("no party named {name}")))
    }

    /// Record on `approver` that `initiator` may run flow `flow_id` against
    /// its cash.
    pub fn approve(&self, approver: &str, flow_id: Uuid, initiator: &str) -> Result<(), FlowError> {
        let initiator = self.require(initiator)?.identity().clone();
        self.require(approver)?.approve(flow_id, &initiator);
        Ok(())
    }

    pub fn revoke_approval(&self, approver: &str, flow_id: &Uuid) -> Result<bool, FlowError> {
        Ok(self.require(approver)?.revoke_approval(flow_id))
    }

    /// Flows run under `flow_id` when given, a fresh one otherwise.
    pub async fn issue(
        &self,
        initiator: &str,
        flow_id: Option<Uuid>,
        data: Vec<MyCashData>,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        let node = self.require(initiator)?;
        let flow_id = flow_id.unwrap_or_else(Uuid::new_v4);
        self.observed(FlowKind::Issue, node.issue_with_id(flow_id, data, anonymous))
            .await
    }

    pub async fn move_cash(
        &self,
        initiator: &str,
        flow_id: Option<Uuid>,
        data: Vec<MyCashData>,
        new_owner: &Party,
        anonymous: bool,
    ) -> Result<CommittedTransaction, FlowError> {
        let node = self.require(initiator)?;
        let flow_id = flow_id.unwrap_or_else(Uuid::new_v4);
        let call = node.move_cash_with_id(flow_id, data, new_owner, anonymous);
        self.observed(FlowKind::Move, call).await
    }

    pub async fn exit(
        &self,
        initiator: &str,
        flow_id: Option<Uuid>,
        refs: Vec<StateRef>,
    ) -> Result<CommittedTransaction, FlowError> {
        let node = self.require(initiator)?;
        let flow_id = flow_id.unwrap_or_else(Uuid::new_v4);
        self.observed(FlowKind::Exit, node.exit_with_id(flow_id, refs)).await
    }

    async fn observed<F>(&self, flow: FlowKind, call: F) -> Result<CommittedTransaction, FlowError>
    where
        F: std::future::Future<Output = Result<CommittedTransaction, FlowError>>,
    {
        self.metrics.flow_started(flow);
        let started = Instant::now();
        let result = call.await;
        let conflict = matches!(&result, Err(e) if e.is_conflict());
        self.metrics
            .flow_finished(flow, started.elapsed(), result.is_ok(), conflict);
        self.refresh_unspent();
        result
    }

    fn refresh_unspent(&self) {
        for (name, node) in &self.nodes {
            self.metrics.set_unspent(name, node.vault().unspent_count());
        }
    }

    /// Flush every vault and take its node off the network.
    pub fn shutdown(self) {
        for recorder in &self.recorders {
            recorder.abort();
        }
        for (_, node) in self.nodes {
            if let Err(e) = node.vault().db().flush() {
                tracing::warn!(error = %e, "vault flush failed");
            }
            node.stop();
        }
        tracing::info!("roster stopped");
    }
}

fn open_db(data_dir: Option<&Path>, name: &str) -> Result<LedgerDb> {
    match data_dir {
        Some(dir) => {
            let path = dir.join(name);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            LedgerDb::open(&path)
                .with_context(|| format!("failed to open database at {}", path.display()))
        }
        None => LedgerDb::open_temporary().context("failed to open in-memory database"),
    }
}

fn load_or_generate_key(data_dir: Option<&Path>, name: &str) -> Result<PartyKeypair> {
    let Some(dir) = data_dir else {
        return Ok(PartyKeypair::generate());
    };
    let path = dir.join(format!("{name}.key"));
    if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        return PartyKeypair::from_hex(raw.trim())
            .map_err(|e| anyhow!("bad key file {}: {}", path.display(), e));
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
    let keypair = PartyKeypair::generate();
    std::fs::write(&path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    tracing::info!(party = name, key_path = %path.display(), "generated party key");
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use mycash_protocol::state::CurrencyCode;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[tokio::test]
    async fn boots_every_configured_party() {
        let roster = Roster::boot(&NodeConfig::default(), Arc::new(NodeMetrics::new())).unwrap();
        assert_eq!(roster.names(), vec!["Alice", "BankA", "BankB", "Bob"]);
        assert_eq!(roster.notary().name(), "Notary");
        let alice = roster.node("Alice").unwrap();
        let bob = roster.party("Bob").unwrap();
        assert_eq!(alice.hub().identities().party_from_name("Bob"), Some(bob));
        roster.shutdown();
    }

    #[tokio::test]
    async fn unknown_initiator_is_an_invalid_request() {
        let roster = Roster::boot(&NodeConfig::default(), Arc::new(NodeMetrics::new())).unwrap();
        match roster.exit("Mallory", None, vec![]).await {
            Err(FlowError::InvalidRequest(_)) => {}
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
        roster.shutdown();
    }

    #[tokio::test]
    async fn flows_are_counted_and_vault_gauges_follow() {
        let metrics = Arc::new(NodeMetrics::new());
        let roster = Roster::boot(&NodeConfig::default(), Arc::clone(&metrics)).unwrap();
        let bank = roster.party("BankA").unwrap();
        let alice = roster.party("Alice").unwrap();

        roster
            .issue(
                "BankA",
                None,
                vec![MyCashData::new(&bank, &alice, 100, usd())],
                false,
            )
            .await
            .unwrap();

        assert_eq!(metrics.flows_started_total.with_label_values(&["issue"]).get(), 1);
        assert_eq!(
            metrics
                .transactions_committed_total
                .with_label_values(&["issue"])
                .get(),
            1
        );
        assert_eq!(metrics.unspent_records.with_label_values(&["Alice"]).get(), 1);
        roster.shutdown();
    }

    #[tokio::test]
    async fn on_disk_roster_writes_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            parties: vec!["Bank".to_string(), "Carol".to_string()],
            data_dir: Some(dir.path().to_path_buf()),
            ..NodeConfig::default()
        };
        let roster = Roster::boot(&config, Arc::new(NodeMetrics::new())).unwrap();
        let bank = roster.party("Bank").unwrap();
        for name in ["Notary", "Bank", "Carol"] {
            assert!(dir.path().join(format!("{name}.key")).exists());
            assert!(dir.path().join(name).is_dir());
        }

        let reloaded = load_or_generate_key(Some(dir.path()), "Bank").unwrap();
        assert_eq!(reloaded.public_key(), bank.owning_key());
        roster.shutdown();
    }

    #[tokio::test]
    async fn approved_flow_lets_a_party_spend_anothers_cash() {
        let roster = Roster::boot(&NodeConfig::default(), Arc::new(NodeMetrics::new())).unwrap();
        let bank = roster.party("BankA").unwrap();
        let alice = roster.party("Alice").unwrap();
        let bob = roster.party("Bob").unwrap();
        roster
            .issue("BankA", None, vec![MyCashData::new(&bank, &alice, 40, usd())], false)
            .await
            .unwrap();

        let request = vec![MyCashData::new(&bank, &alice, 15, usd())];
        let refused = roster.move_cash("Bob", None, request.clone(), &bob, false).await;
        assert!(matches!(refused, Err(FlowError::Rejected { .. })));

        let flow_id = Uuid::new_v4();
        roster.approve("Alice", flow_id, "Bob").unwrap();
        roster
            .move_cash("Bob", Some(flow_id), request, &bob, false)
            .await
            .unwrap();
        assert_eq!(roster.node("Bob").unwrap().vault().unspent_count(), 1);
        assert!(roster.revoke_approval("Alice", &flow_id).unwrap());
        roster.shutdown();
    }

    #[test]
    fn in_memory_keys_are_fresh() {
        let a = load_or_generate_key(None, "Bank").unwrap();
        let b = load_or_generate_key(None, "Bank").unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }
}
