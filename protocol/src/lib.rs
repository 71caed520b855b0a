// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MyCash Protocol
//!
//! A fungible cash ledger in the UTXO style. Parties hold private views of
//! shared state; every transaction consumes unspent cash records and
//! creates new ones, and it only lands once the contract accepts it, every
//! required signer has countersigned, and the notary has ordered it.
//!
//! ## Module map
//!
//! ```text
//! crypto       Ed25519 keys, signatures, SHA-256 ids
//! identity     well-known and confidential parties, resolver, key store
//! state        the MyCash record, state refs, persisted projection
//! contract     Issue / Move / Exit verification rules
//! transaction  builder, proposal, signatures, committed transactions
//! storage      sled-backed ledger database
//! vault        per-party unspent store and coin selection
//! notary       finalization gateway (double-spend authority)
//! network      in-process sessions between parties
//! flows        signature collection, responder, finality, business flows
//! node         one party's runtime tying it all together
//! ```

pub mod config;
pub mod contract;
pub mod crypto;
pub mod flows;
pub mod identity;
pub mod network;
pub mod node;
pub mod notary;
pub mod state;
pub mod storage;
pub mod transaction;
pub mod vault;

pub use node::MyCashNode;
