//! # Protocol Configuration & Constants
//!
//! Every magic number in MyCash lives here, together with [`ProtocolConfig`],
//! the handful of knobs a deployment is allowed to turn. Anything not in
//! `ProtocolConfig` is part of the ledger's contract with its participants
//! and changing it means every node has to agree on the new value.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Contract & Schema
// ---------------------------------------------------------------------------

/// Identifier of the cash contract. Every MyCash state points at it, and the
/// verifier refuses to look at states that claim a different contract.
pub const MYCASH_CONTRACT_ID: &str = "com.mycash.contract.MyCashContract";

/// Name of the persisted projection of a cash record.
pub const MYCASH_SCHEMA_NAME: &str = "mycash_states";

/// Schema version of the projection. Bump when a column changes meaning.
pub const MYCASH_SCHEMA_VERSION: u32 = 1;

/// ISO 4217 codes are three letters. So are ours.
pub const CURRENCY_CODE_LENGTH: usize = 3;

/// Minor-unit digits assumed when rendering an amount for humans.
pub const DEFAULT_MINOR_UNIT_DIGITS: u32 = 2;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version string reported by nodes and the operator API.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte mixed into every transaction id. Changing it changes every id.
pub const TRANSACTION_FORMAT_VERSION: u16 = 1;

/// Domain separator for confidential identity certificates, so a
/// certificate signature can never be replayed as a transaction signature.
pub const IDENTITY_CERT_DOMAIN: &[u8] = b"mycash/confidential-identity/v1";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 for everything that signs.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Public (verifying) key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Hash output length in bytes (SHA-256).
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Timing Defaults
// ---------------------------------------------------------------------------

/// How long an initiator waits for one counterparty to answer a proposal,
/// a selection query or an identity swap before giving up on the attempt.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on notarisation plus distribution of a fully signed tx.
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before a conflicted attempt re-runs coin selection. Gives the
/// winning transaction time to reach our vault.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// How many times a Move or Exit is rebuilt after a double-spend conflict.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Channel Capacities
// ---------------------------------------------------------------------------

/// Bounded inbox per node. Senders wait when a node falls this far behind.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Progress event buffer. Slow subscribers lose old events, never block flows.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// ProtocolConfig
// ---------------------------------------------------------------------------

/// Runtime knobs for a node. Durations are milliseconds so the struct reads
/// naturally from JSON config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Per-round-trip timeout for any counterparty request.
    pub response_timeout_ms: u64,
    /// Timeout for notarisation and distribution.
    pub finality_timeout_ms: u64,
    /// Maximum rebuilds after a double-spend conflict.
    pub max_conflict_retries: u32,
    /// Base delay before a rebuild; doubles on each retry.
    pub retry_backoff_ms: u64,
    /// Capacity of the node's inbound message queue.
    pub inbox_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            finality_timeout_ms: DEFAULT_FINALITY_TIMEOUT.as_millis() as u64,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based), doubling each time
    /// and capped at 32x the base so a misconfigured retry count can't
    /// stall a flow for minutes.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(5);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
