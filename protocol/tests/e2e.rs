//! End-to-end tests for MyCash.
//!
//! Every test builds its own network: a notary plus a handful of party
//! nodes with in-memory vaults, all introduced to each other. Flows run
//! for real over the in-process router.

use std::sync::Arc;
use uuid::Uuid;

use mycash_protocol::config::ProtocolConfig;
use mycash_protocol::contract::{CashCommand, Contract, ContractError};
use mycash_protocol::crypto::PartyKeypair;
use mycash_protocol::flows::responder::verify_and_sign;
use mycash_protocol::flows::{FlowError, MyCashData, SigningState};
use mycash_protocol::identity::{IdentityResolver, KeyManagementService, Party};
use mycash_protocol::network::{Network, NetworkError, ProposalEnvelope};
use mycash_protocol::notary::{FinalizationGateway, SimpleNotary};
use mycash_protocol::state::{CurrencyCode, MyCash, StateRef};
use mycash_protocol::transaction::{LedgerTransaction, SignedTransaction, TransactionBuilder};
use mycash_protocol::vault::{CashQuery, SelectionError, Vault};
use mycash_protocol::MyCashNode;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Ledger {
    network: Network,
    notary: Arc<SimpleNotary>,
    config: ProtocolConfig,
    nodes: Vec<MyCashNode>,
}

impl Ledger {
    fn node(&self, name: &str) -> &MyCashNode {
        self.nodes
            .iter()
            .find(|n| n.identity().name() == name)
            .expect("no such node")
    }

    fn party(&self, name: &str) -> Party {
        self.node(name).identity().clone()
    }

    /// Add a node and introduce it to everyone already present.
    fn add(&mut self, node: MyCashNode) {
        for other in &self.nodes {
            other.register_party(node.identity());
            node.register_party(other.identity());
        }
        self.nodes.push(node);
    }

    fn add_with_contract(&mut self, name: &str, contract: Arc<dyn Contract>) {
        let node = MyCashNode::start_with(
            KeyManagementService::new(name, PartyKeypair::generate()),
            Vault::open_temporary().unwrap(),
            self.network.clone(),
            self.notary.clone(),
            contract,
            self.config.clone(),
        )
        .unwrap();
        self.add(node);
    }
}

fn ledger_with(names: &[&str], config: ProtocolConfig) -> Ledger {
    let network = Network::new();
    let notary = Arc::new(SimpleNotary::open_temporary("Notary").unwrap());
    let mut ledger = Ledger {
        network,
        notary,
        config,
        nodes: Vec::new(),
    };
    for name in names {
        let node = MyCashNode::start(
            *name,
            PartyKeypair::generate(),
            ledger.network.clone(),
            ledger.notary.clone(),
            ledger.config.clone(),
        )
        .unwrap();
        ledger.add(node);
    }
    ledger
}

fn ledger(names: &[&str]) -> Ledger {
    ledger_with(
        names,
        ProtocolConfig {
            response_timeout_ms: 2_000,
            retry_backoff_ms: 5,
            ..ProtocolConfig::default()
        },
    )
}

fn ccy(code: &str) -> CurrencyCode {
    CurrencyCode::new(code).unwrap()
}

fn cash(issuer: &Party, owner: &Party, amount: u64, code: &str) -> MyCashData {
    MyCashData::new(issuer, owner, amount, ccy(code))
}

/// Amounts of every unspent record `node` holds, oldest first.
fn holdings(node: &MyCashNode) -> Vec<u64> {
    node.vault()
        .query_unspent(&CashQuery::default())
        .unwrap()
        .iter()
        .map(|s| s.data().amount())
        .collect()
}

fn unspent_refs(node: &MyCashNode) -> Vec<StateRef> {
    node.vault()
        .query_unspent(&CashQuery::default())
        .unwrap()
        .iter()
        .map(|s| s.reference)
        .collect()
}

/// A contract that refuses everything.
struct RejectAll;

impl Contract for RejectAll {
    fn verify(
        &self,
        tx: &LedgerTransaction,
        _identities: &dyn IdentityResolver,
    ) -> Result<(), ContractError> {
        Err(ContractError::NoOutputs {
            command: tx.command.value,
        })
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issue_move_exit_lifecycle() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));

    let issued = bank
        .issue(vec![cash(bank.identity(), alice.identity(), 100, "USD")], false)
        .await
        .unwrap();
    assert_eq!(holdings(alice), vec![100]);
    assert!(holdings(bank).is_empty());
    assert!(issued
        .stx
        .tx
        .required_signers()
        .contains(&bank.identity().owning_key()));
    let original = StateRef::new(issued.id(), 0);

    let moved = alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 30, "USD")],
            bob.identity(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(moved.stx.tx.inputs, vec![original]);
    assert_eq!(holdings(alice), vec![70]);
    assert_eq!(holdings(bob), vec![30]);
    assert!(alice.vault().is_consumed(&original).unwrap());

    let change = unspent_refs(alice);
    let exited = alice.exit(change.clone()).await.unwrap();
    assert!(exited.stx.tx.outputs.is_empty());
    let signers = exited.stx.tx.required_signers();
    assert!(signers.contains(&bank.identity().owning_key()));
    assert!(signers.contains(&alice.identity().owning_key()));
    assert!(holdings(alice).is_empty());
    assert!(alice.vault().is_consumed(&change[0]).unwrap());
    assert_eq!(holdings(bob), vec![30]);

    // Every committed transaction got a distinct, increasing sequence.
    assert!(issued.sequence < moved.sequence && moved.sequence < exited.sequence);
    assert_eq!(l.notary.consumed_count(), 2);
}

#[tokio::test]
async fn issuer_records_the_issuance_it_signed() {
    let l = ledger(&["Bank", "Alice"]);
    let (bank, alice) = (l.node("Bank"), l.node("Alice"));
    let flow_id = Uuid::new_v4();
    bank.approve(flow_id, alice.identity());
    let issued = alice
        .issue_with_id(
            flow_id,
            vec![cash(bank.identity(), alice.identity(), 40, "EUR")],
            false,
        )
        .await
        .unwrap();

    // Alice proposed on the bank's behalf; the bank signed and was told.
    assert!(bank.vault().get_transaction(&issued.id()).unwrap().is_some());
    assert_eq!(holdings(alice), vec![40]);
}

#[tokio::test]
async fn progress_events_follow_the_signing_states() {
    let l = ledger(&["Bank", "Alice"]);
    let (bank, alice) = (l.node("Bank"), l.node("Alice"));
    let mut events = bank.subscribe_progress();

    bank.issue(vec![cash(bank.identity(), alice.identity(), 5, "USD")], false)
        .await
        .unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        states.push(event.state);
    }
    assert_eq!(states[0], SigningState::Proposed);
    assert_eq!(states[1], SigningState::AwaitingSignatures { pending: 1 });
    assert_eq!(states[2], SigningState::FullySigned);
    assert!(matches!(states[3], SigningState::Committed { .. }));
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multi_currency_move_returns_change_per_currency() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));
    bank.issue(
        vec![
            cash(bank.identity(), alice.identity(), 100, "USD"),
            cash(bank.identity(), alice.identity(), 50, "GBP"),
        ],
        false,
    )
    .await
    .unwrap();

    let moved = alice
        .move_cash(
            vec![
                cash(bank.identity(), alice.identity(), 10, "USD"),
                cash(bank.identity(), alice.identity(), 28, "USD"),
                cash(bank.identity(), alice.identity(), 35, "GBP"),
            ],
            bob.identity(),
            false,
        )
        .await
        .unwrap();

    let outputs: Vec<(u64, &str, &str)> = moved
        .stx
        .tx
        .outputs
        .iter()
        .map(|o| {
            (
                o.amount(),
                o.currency().as_str(),
                o.owner().name_or_none().unwrap_or("?"),
            )
        })
        .collect();
    assert_eq!(
        outputs,
        vec![
            (38, "USD", "Bob"),
            (35, "GBP", "Bob"),
            (62, "USD", "Alice"),
            (15, "GBP", "Alice"),
        ]
    );
    assert_eq!(holdings(alice), vec![62, 15]);
    assert_eq!(holdings(bob), vec![38, 35]);
}

#[tokio::test]
async fn insufficient_funds_reports_the_shortfall() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));
    bank.issue(vec![cash(bank.identity(), alice.identity(), 100, "USD")], false)
        .await
        .unwrap();

    match alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 500, "USD")],
            bob.identity(),
            false,
        )
        .await
    {
        Err(FlowError::Selection(SelectionError::InsufficientFunds { shortfall, .. })) => {
            assert_eq!(shortfall, 400);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(holdings(alice), vec![100]);
}

#[tokio::test]
async fn move_collects_cash_from_several_owners() {
    let l = ledger(&["Bank", "Alice", "Bob", "Charlie"]);
    let (bank, alice, bob, charlie) = (
        l.node("Bank"),
        l.node("Alice"),
        l.node("Bob"),
        l.node("Charlie"),
    );
    bank.issue(
        vec![
            cash(bank.identity(), alice.identity(), 50, "USD"),
            cash(bank.identity(), bob.identity(), 50, "USD"),
        ],
        false,
    )
    .await
    .unwrap();

    let flow_id = Uuid::new_v4();
    alice.approve(flow_id, charlie.identity());
    bob.approve(flow_id, charlie.identity());
    let moved = charlie
        .move_cash_with_id(
            flow_id,
            vec![
                cash(bank.identity(), alice.identity(), 30, "USD"),
                cash(bank.identity(), bob.identity(), 20, "USD"),
            ],
            charlie.identity(),
            false,
        )
        .await
        .unwrap();

    let signers = moved.stx.tx.required_signers();
    assert!(signers.contains(&alice.identity().owning_key()));
    assert!(signers.contains(&bob.identity().owning_key()));
    assert_eq!(holdings(charlie), vec![30, 20]);
    assert_eq!(holdings(alice), vec![20]);
    assert_eq!(holdings(bob), vec![30]);
}

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn owner_refuses_to_select_cash_for_an_unapproved_flow() {
    let l = ledger(&["Bank", "Alice", "Mallory"]);
    let (bank, alice, mallory) = (l.node("Bank"), l.node("Alice"), l.node("Mallory"));
    bank.issue(vec![cash(bank.identity(), alice.identity(), 50, "USD")], false)
        .await
        .unwrap();

    match mallory
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 50, "USD")],
            mallory.identity(),
            false,
        )
        .await
    {
        Err(FlowError::Rejected { party, .. }) => assert_eq!(party, "Alice"),
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert_eq!(holdings(alice), vec![50]);
    assert!(holdings(mallory).is_empty());
}

#[tokio::test]
async fn approval_for_another_flow_does_not_carry_over() {
    let l = ledger(&["Bank", "Alice", "Charlie"]);
    let (bank, alice, charlie) = (l.node("Bank"), l.node("Alice"), l.node("Charlie"));
    bank.issue(vec![cash(bank.identity(), alice.identity(), 50, "USD")], false)
        .await
        .unwrap();
    let approved = Uuid::new_v4();
    alice.approve(approved, charlie.identity());

    let request = vec![cash(bank.identity(), alice.identity(), 20, "USD")];
    let refused = charlie
        .move_cash_with_id(Uuid::new_v4(), request.clone(), charlie.identity(), false)
        .await;
    assert!(matches!(refused, Err(FlowError::Rejected { .. })));

    assert!(alice.revoke_approval(&approved));
    let revoked = charlie
        .move_cash_with_id(approved, request, charlie.identity(), false)
        .await;
    assert!(matches!(revoked, Err(FlowError::Rejected { .. })));
    assert_eq!(holdings(alice), vec![50]);
}

#[tokio::test]
async fn issuer_refuses_an_unapproved_mint() {
    let l = ledger(&["Bank", "Mallory"]);
    let (bank, mallory) = (l.node("Bank"), l.node("Mallory"));

    match mallory
        .issue(vec![cash(bank.identity(), mallory.identity(), 1_000, "USD")], false)
        .await
    {
        Err(FlowError::Rejected { party, reason }) => {
            assert_eq!(party, "Bank");
            assert!(reason.contains("Mallory"), "{reason}");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert!(holdings(mallory).is_empty());
    assert!(bank.vault().balances().unwrap().is_empty());
}

#[tokio::test]
async fn owner_signs_a_crafted_spend_only_once_approved() {
    let l = ledger(&["Bank", "Alice", "Mallory"]);
    let (bank, alice, mallory) = (l.node("Bank"), l.node("Alice"), l.node("Mallory"));
    let issued = bank
        .issue(vec![cash(bank.identity(), alice.identity(), 100, "USD")], false)
        .await
        .unwrap();
    let input = alice
        .vault()
        .query_unspent(&CashQuery::default())
        .unwrap()
        .remove(0);

    let output = MyCash::new(bank.identity(), mallory.identity(), 100, ccy("USD")).unwrap();
    let wtx = TransactionBuilder::new(l.notary.identity().clone())
        .add_input(input)
        .add_output(output)
        .command(CashCommand::Move)
        .add_signers([alice.identity().owning_key(), mallory.identity().owning_key()])
        .build()
        .unwrap();
    let envelope = ProposalEnvelope {
        flow_id: Uuid::new_v4(),
        stx: SignedTransaction::new(wtx),
        dependencies: vec![issued],
        certificates: vec![],
    };

    match verify_and_sign(alice.hub(), mallory.identity(), &envelope) {
        Err(FlowError::Unauthorised { initiator, command }) => {
            assert_eq!(initiator, "Mallory");
            assert_eq!(command, CashCommand::Move);
        }
        other => panic!("expected Unauthorised, got {:?}", other),
    }
    // An approval naming someone else does not cover Mallory.
    alice.approve(envelope.flow_id, bank.identity());
    assert!(verify_and_sign(alice.hub(), mallory.identity(), &envelope).is_err());

    alice.approve(envelope.flow_id, mallory.identity());
    let sigs = verify_and_sign(alice.hub(), mallory.identity(), &envelope).unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].by, alice.identity().owning_key());
}

// ---------------------------------------------------------------------------
// Double spends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_moves_retry_onto_other_records() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));
    bank.issue(
        vec![
            cash(bank.identity(), alice.identity(), 60, "USD"),
            cash(bank.identity(), alice.identity(), 60, "USD"),
        ],
        false,
    )
    .await
    .unwrap();

    let request = || vec![cash(bank.identity(), alice.identity(), 50, "USD")];
    let (first, second) = tokio::join!(
        alice.move_cash(request(), bob.identity(), false),
        alice.move_cash(request(), bob.identity(), false),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.stx.tx.inputs, second.stx.tx.inputs);

    let mut received = holdings(bob);
    received.sort_unstable();
    assert_eq!(received, vec![50, 50]);
    assert_eq!(holdings(alice), vec![10, 10]);
}

#[tokio::test]
async fn double_spend_without_retries_is_a_conflict() {
    let l = ledger_with(
        &["Bank", "Alice", "Bob"],
        ProtocolConfig {
            max_conflict_retries: 0,
            ..ProtocolConfig::default()
        },
    );
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));
    bank.issue(
        vec![
            cash(bank.identity(), alice.identity(), 60, "USD"),
            cash(bank.identity(), alice.identity(), 60, "USD"),
        ],
        false,
    )
    .await
    .unwrap();

    let request = || vec![cash(bank.identity(), alice.identity(), 50, "USD")];
    let (first, second) = tokio::join!(
        alice.move_cash(request(), bob.identity(), false),
        alice.move_cash(request(), bob.identity(), false),
    );
    let outcomes = [first, second];
    let committed = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);
    match outcomes.into_iter().find(|r| r.is_err()) {
        Some(Err(FlowError::Conflict { consumed })) => assert_eq!(consumed.len(), 1),
        other => panic!("expected Conflict, got {:?}", other),
    }
    assert_eq!(holdings(bob), vec![50]);
}

#[tokio::test]
async fn gateway_refuses_a_replayed_transaction() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));
    bank.issue(vec![cash(bank.identity(), alice.identity(), 10, "USD")], false)
        .await
        .unwrap();
    let moved = alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 10, "USD")],
            bob.identity(),
            false,
        )
        .await
        .unwrap();

    match l.notary.submit(moved.stx.clone()).await {
        Err(mycash_protocol::notary::GatewayError::Conflict { consumed }) => {
            assert_eq!(consumed, moved.stx.tx.inputs);
        }
        other => panic!("expected Conflict, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Confidential identities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_issue_and_move_hide_well_known_keys() {
    let l = ledger(&["Bank", "Alice", "Bob"]);
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.node("Bob"));

    let issued = bank
        .issue(vec![cash(bank.identity(), alice.identity(), 100, "USD")], true)
        .await
        .unwrap();
    let output = &issued.stx.tx.outputs[0];
    assert!(output.issuer().is_anonymous());
    assert!(output.owner().is_anonymous());
    assert_ne!(output.owner().owning_key(), alice.identity().owning_key());

    let held = alice.known_holdings(&CashQuery::owned_by(alice.identity())).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].data.issuer, *bank.identity());
    assert_eq!(held[0].data.owner, *alice.identity());

    let moved = alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 30, "USD")],
            bob.identity(),
            true,
        )
        .await
        .unwrap();
    for o in &moved.stx.tx.outputs {
        assert!(o.owner().is_anonymous());
        assert!(o.issuer().is_anonymous());
    }

    let bob_view = bob.known_holdings(&CashQuery::default()).unwrap();
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].data.amount, 30);
    assert_eq!(bob_view[0].data.issuer, *bank.identity());
    assert_eq!(bob_view[0].data.owner, *bob.identity());

    let alice_view = alice.known_holdings(&CashQuery::default()).unwrap();
    assert_eq!(alice_view.len(), 1);
    assert_eq!(alice_view[0].data.amount, 70);

    // The confidential change can still be exited with the bank.
    let refs = alice_view.iter().map(|h| h.reference).collect();
    alice.exit(refs).await.unwrap();
    assert!(holdings(alice).is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_single_rejection_aborts_the_move() {
    let mut l = ledger(&["Bank", "Alice"]);
    l.add_with_contract("Bob", Arc::new(RejectAll));
    let (bank, alice, bob) = (l.node("Bank"), l.node("Alice"), l.party("Bob"));
    let issued = bank
        .issue(vec![cash(bank.identity(), alice.identity(), 100, "USD")], false)
        .await
        .unwrap();

    match alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 30, "USD")],
            &bob,
            false,
        )
        .await
    {
        Err(FlowError::Rejected { party, .. }) => assert_eq!(party, "Bob"),
        other => panic!("expected Rejected, got {:?}", other),
    }
    // Nothing was committed: the record is still spendable.
    let original = StateRef::new(issued.id(), 0);
    assert!(!alice.vault().is_consumed(&original).unwrap());
    assert!(!l.notary.is_consumed(&original).await.unwrap());
    assert_eq!(holdings(alice), vec![100]);
}

#[tokio::test]
async fn unresponsive_counterparty_times_out() {
    let l = ledger_with(
        &["Bank", "Alice"],
        ProtocolConfig {
            response_timeout_ms: 100,
            ..ProtocolConfig::default()
        },
    );
    // Bob is on the network map but nobody reads his inbox.
    let bob = Party::new("Bob", PartyKeypair::generate().public_key());
    let _inbox = l.network.register(&bob, 8);
    for node in &l.nodes {
        node.register_party(&bob);
    }
    let (bank, alice) = (l.node("Bank"), l.node("Alice"));
    bank.issue(vec![cash(bank.identity(), alice.identity(), 10, "USD")], false)
        .await
        .unwrap();

    match alice
        .move_cash(
            vec![cash(bank.identity(), alice.identity(), 10, "USD")],
            &bob,
            false,
        )
        .await
    {
        Err(FlowError::Network(NetworkError::Timeout { party, .. })) => {
            assert_eq!(party, "Bob")
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert_eq!(holdings(alice), vec![10]);
}

#[tokio::test]
async fn offline_counterparty_is_unknown() {
    let mut l = ledger(&["Bank", "Alice", "Bob"]);
    let bob = l.party("Bob");
    let index = l.nodes.iter().position(|n| n.identity() == &bob).unwrap();
    l.nodes.remove(index).stop();

    let (bank, alice) = (l.node("Bank"), l.node("Alice"));
    match bank
        .issue(vec![cash(bank.identity(), &bob, 10, "USD")], false)
        .await
    {
        Err(FlowError::Network(NetworkError::UnknownParty { party })) => {
            assert_eq!(party, "Bob")
        }
        other => panic!("expected UnknownParty, got {:?}", other),
    }
    assert!(holdings(alice).is_empty());
}

#[tokio::test]
async fn self_issue_fails_before_any_round_trip() {
    let l = ledger(&["Bank"]);
    let bank = l.node("Bank");
    match bank
        .issue(vec![cash(bank.identity(), bank.identity(), 10, "USD")], true)
        .await
    {
        Err(FlowError::Validation(ContractError::SelfIssue { .. })) => {}
        other => panic!("expected SelfIssue, got {:?}", other),
    }
}

#[tokio::test]
async fn bystander_refuses_to_sign() {
    let l = ledger(&["Bank", "Alice", "Charlie"]);
    let (bank, alice, charlie) = (l.node("Bank"), l.node("Alice"), l.node("Charlie"));

    let output = MyCash::new(bank.identity(), alice.identity(), 10, ccy("USD")).unwrap();
    let wtx = TransactionBuilder::new(l.notary.identity().clone())
        .add_output(output)
        .command(CashCommand::Issue)
        .add_signers([
            bank.identity().owning_key(),
            alice.identity().owning_key(),
            charlie.identity().owning_key(),
        ])
        .build()
        .unwrap();
    let envelope = ProposalEnvelope {
        flow_id: Uuid::new_v4(),
        stx: SignedTransaction::new(wtx),
        dependencies: vec![],
        certificates: vec![],
    };

    match verify_and_sign(charlie.hub(), bank.identity(), &envelope) {
        Err(FlowError::NotStakeholder { command }) => assert_eq!(command, CashCommand::Issue),
        other => panic!("expected NotStakeholder, got {:?}", other),
    }
}
