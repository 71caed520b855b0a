// Ledger hot-path benchmarks.
//
// Covers contract verification of a many-input move, first-fit coin
// selection over a populated vault, and required-signature checks.

use std::collections::HashSet;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mycash_protocol::contract::{CashCommand, CommandWithSigners, Contract, MyCashContract};
use mycash_protocol::crypto::{sha256, PartyKeypair, PublicKey};
use mycash_protocol::identity::{AbstractParty, IdentityService, Party};
use mycash_protocol::state::{CurrencyCode, MyCash, StateAndRef, StateRef, TransactionState};
use mycash_protocol::transaction::{
    CommittedTransaction, LedgerTransaction, SignedTransaction, TransactionSignature,
    WireTransaction,
};
use mycash_protocol::vault::{CashSelector, MoveRequest, Vault};

struct Parties {
    identities: IdentityService,
    bank: Party,
    alice: Party,
    bob: Party,
    notary: Party,
    notary_kp: PartyKeypair,
}

fn parties() -> Parties {
    let identities = IdentityService::new();
    let party = |name: &str| Party::new(name, PartyKeypair::generate().public_key());
    let notary_kp = PartyKeypair::generate();
    let parties = Parties {
        bank: party("Bank"),
        alice: party("Alice"),
        bob: party("Bob"),
        notary: Party::new("Notary", notary_kp.public_key()),
        notary_kp,
        identities,
    };
    for p in [&parties.bank, &parties.alice, &parties.bob, &parties.notary] {
        parties.identities.register_party(p.clone());
    }
    parties
}

fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").unwrap()
}

fn move_of(p: &Parties, inputs: usize) -> LedgerTransaction {
    let inputs: Vec<StateAndRef> = (0..inputs)
        .map(|i| StateAndRef {
            state: TransactionState {
                data: MyCash::new(p.bank.clone(), p.alice.clone(), 10, usd()).unwrap(),
                notary: p.notary.clone(),
            },
            reference: StateRef::new(sha256(&(i as u64).to_le_bytes()), 0),
        })
        .collect();
    let total = 10 * inputs.len() as u64;
    let outputs = vec![
        MyCash::new(p.bank.clone(), p.bob.clone(), total - 5, usd()).unwrap(),
        MyCash::new(p.bank.clone(), p.alice.clone(), 5, usd()).unwrap(),
    ];
    LedgerTransaction {
        id: sha256(b"bench"),
        inputs,
        outputs,
        command: CommandWithSigners::new(
            CashCommand::Move,
            vec![p.alice.owning_key(), p.bob.owning_key()],
        ),
        notary: p.notary.clone(),
    }
}

/// A vault holding `records` issuances of 10 USD each, owned by Alice.
fn populated_vault(p: &Parties, records: usize) -> Vault {
    let vault = Vault::open_temporary().unwrap();
    let outputs: Vec<MyCash> = (0..records)
        .map(|_| MyCash::new(p.bank.clone(), p.alice.clone(), 10, usd()).unwrap())
        .collect();
    let stx = SignedTransaction::new(WireTransaction {
        inputs: vec![],
        outputs,
        command: CommandWithSigners::new(CashCommand::Issue, Vec::<PublicKey>::new()),
        notary: p.notary.clone(),
    });
    let sig = p.notary_kp.sign(stx.id().as_bytes());
    let committed = CommittedTransaction {
        notary_signature: TransactionSignature::new(p.notary.owning_key(), sig),
        stx,
        sequence: 1,
        committed_at: Utc::now(),
    };
    let alice = p.alice.owning_key();
    vault
        .record_transaction(&committed, |party: &AbstractParty| party.owning_key() == alice)
        .unwrap();
    vault
}

fn bench_verify_move(c: &mut Criterion) {
    let p = parties();
    let mut group = c.benchmark_group("contract/verify_move");
    for inputs in [1usize, 16, 128] {
        let tx = move_of(&p, inputs);
        group.throughput(Throughput::Elements(inputs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(inputs), &tx, |b, tx| {
            b.iter(|| MyCashContract.verify(tx, &p.identities).unwrap());
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let p = parties();
    let mut group = c.benchmark_group("vault/select_first_fit");
    for records in [10usize, 100, 1_000] {
        let vault = populated_vault(&p, records);
        let selector = CashSelector::new(&vault, &p.identities);
        // Half the vault, so selection walks that many candidates.
        let request = MoveRequest::new(p.alice.clone(), p.bank.clone(), 5 * records as u64, usd());
        let exclude = HashSet::new();
        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &request, |b, request| {
            b.iter(|| selector.select(request, &exclude).unwrap());
        });
    }
    group.finish();
}

fn bench_required_signatures(c: &mut Criterion) {
    let signers: Vec<PartyKeypair> = (0..8).map(|_| PartyKeypair::generate()).collect();
    let notary = Party::new("Notary", PartyKeypair::generate().public_key());
    let mut stx = SignedTransaction::new(WireTransaction {
        inputs: vec![],
        outputs: vec![],
        command: CommandWithSigners::new(
            CashCommand::Move,
            signers.iter().map(|kp| kp.public_key()).collect::<Vec<_>>(),
        ),
        notary,
    });
    let id = stx.id();
    for kp in &signers {
        stx.add_signature(TransactionSignature::new(kp.public_key(), kp.sign(id.as_bytes())));
    }

    c.bench_function("transaction/verify_required_signatures_8", |b| {
        b.iter(|| stx.verify_required_signatures().unwrap());
    });
}

criterion_group!(
    benches,
    bench_verify_move,
    bench_select,
    bench_required_signatures
);
criterion_main!(benches);
