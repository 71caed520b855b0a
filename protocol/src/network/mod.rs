//! # Network
//!
//! Sessions between parties. Transport is an in-process router of tokio
//! channels; the message shapes in [`messages`] are what the protocol
//! depends on.

pub mod messages;
pub mod router;

use thiserror::Error;

pub use messages::{
    Message, ProposalEnvelope, QueryResponse, RecordEnvelope, Response, SelectionQuery,
    SignatureResponse,
};
pub use router::{InboundRequest, Network, Session};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no party named {party} on the network")]
    UnknownParty { party: String },

    #[error("{party} disconnected")]
    Disconnected { party: String },

    #[error("no reply from {party} within {after_ms} ms")]
    Timeout { party: String, after_ms: u64 },

    #[error("unexpected {got} reply from {party}")]
    UnexpectedResponse { party: String, got: &'static str },

    #[error("{party} reported an error: {reason}")]
    Remote { party: String, reason: String },
}
