//! # Vault Module
//!
//! Where a party's cash lives.
//!
//! ```text
//! store.rs     — Vault: recorded transactions, unspent index, balances
//! selection.rs — CashSelector: first-fit coin selection with change
//! ```
//!
//! 1. **Append-only.** Committed outputs are appended; spent records are
//!    marked consumed. A record is never edited.
//!
//! 2. **Stable order.** Queries come back in insertion order, so selection
//!    over the same vault picks the same records every time.

pub mod selection;
pub mod store;

pub use selection::{consolidate, CashSelector, MoveRequest, Selection, SelectionError};
pub use store::{Balance, CashQuery, RecordSummary, Vault};
