//! Messages exchanged between parties.
//!
//! Every type derives serde so the in-process router could be swapped for
//! a real transport; nothing here assumes a wire format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::IdentityCertificate;
use crate::state::{CurrencyCode, MyCash, StateAndRef, StateRef};
use crate::transaction::{CommittedTransaction, SignedTransaction, TransactionSignature};
use crate::vault::MoveRequest;

/// A proposal for the counterparty to verify and sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalEnvelope {
    /// The initiator's flow. Approvals are granted against it.
    pub flow_id: Uuid,
    pub stx: SignedTransaction,
    /// The committed transactions that created the inputs.
    pub dependencies: Vec<CommittedTransaction>,
    /// Certificates for confidential identities the proposal mentions.
    pub certificates: Vec<IdentityCertificate>,
}

/// Ask a counterparty's vault to pick inputs for one or more withdrawals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionQuery {
    pub flow_id: Uuid,
    pub requests: Vec<MoveRequest>,
    /// Refs the gateway already reported consumed.
    pub exclude: Vec<StateRef>,
}

/// A committed transaction for the recipient to record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub committed: CommittedTransaction,
    pub dependencies: Vec<CommittedTransaction>,
    pub certificates: Vec<IdentityCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    ProposeTransaction(ProposalEnvelope),
    SelectCash(SelectionQuery),
    /// Offer our confidential certificate and ask for theirs.
    SwapIdentities(IdentityCertificate),
    /// One-way: please register this certificate.
    RegisterIdentity(IdentityCertificate),
    RecordTransaction(RecordEnvelope),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProposeTransaction(_) => "propose_transaction",
            Self::SelectCash(_) => "select_cash",
            Self::SwapIdentities(_) => "swap_identities",
            Self::RegisterIdentity(_) => "register_identity",
            Self::RecordTransaction(_) => "record_transaction",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignatureResponse {
    Signed(Vec<TransactionSignature>),
    Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryResponse {
    Selected {
        inputs: Vec<StateAndRef>,
        change: Vec<MyCash>,
        dependencies: Vec<CommittedTransaction>,
        certificates: Vec<IdentityCertificate>,
    },
    Insufficient {
        currency: CurrencyCode,
        requested: u64,
        available: u64,
        shortfall: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Signatures(SignatureResponse),
    Selection(QueryResponse),
    Identity(IdentityCertificate),
    Ack,
    Error(String),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signatures(_) => "signatures",
            Self::Selection(_) => "selection",
            Self::Identity(_) => "identity",
            Self::Ack => "ack",
            Self::Error(_) => "error",
        }
    }
}
