//! # Storage Module
//!
//! Persistent storage for a node's slice of the ledger: the transactions it
//! has seen and the cash records it holds.
//!
//! ```text
//! db.rs — LedgerDb, sled trees plus bincode encoding helpers
//! ```
//!
//! Bincode for on-disk values. JSON is for the HTTP surface only.

pub mod db;

pub use db::{abort, decode, encode, read_u64, reserve_sequence, DbError, DbResult, LedgerDb};
