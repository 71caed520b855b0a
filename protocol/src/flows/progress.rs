//! Signing progress.
//!
//! A [`SignatureCollection`] walks one flow attempt through the signing
//! states and broadcasts a [`ProgressEvent`] on every transition. Nothing
//! else holds progress: subscribers see the events, the flow owns the
//! machine.
//!
//! ```text
//! initiator:  Proposed -> AwaitingSignatures -> FullySigned -> Committed
//!                  \______________\__________________\_______> Failed
//! responder:  PeerValidating -> Signed | Rejected
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::crypto::SecureHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    Issue,
    Move,
    Exit,
    Responder,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Move => "move",
            Self::Exit => "exit",
            Self::Responder => "responder",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningState {
    /// Built, verified and signed locally.
    Proposed,
    /// Proposal out with `pending` counterparties.
    AwaitingSignatures { pending: usize },
    /// Responder side: re-verifying a received proposal.
    PeerValidating,
    Signed,
    Rejected { reason: String },
    FullySigned,
    Committed { sequence: u64 },
    Failed { reason: String },
}

impl SigningState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::AwaitingSignatures { .. } => "awaiting_signatures",
            Self::PeerValidating => "peer_validating",
            Self::Signed => "signed",
            Self::Rejected { .. } => "rejected",
            Self::FullySigned => "fully_signed",
            Self::Committed { .. } => "committed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Signed | Self::Rejected { .. } | Self::Committed { .. } | Self::Failed { .. }
        )
    }
}

/// One transition, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub flow_id: Uuid,
    pub flow: FlowKind,
    pub state: SigningState,
    /// Known from `Proposed` onwards.
    pub tx_id: Option<SecureHash>,
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("illegal signing transition {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Guarded signing state machine for one flow attempt.
///
/// An initiator machine starts with no state and enters `Proposed` once
/// the proposal exists; it may fail before that. A responder machine
/// starts in `PeerValidating`.
pub struct SignatureCollection {
    flow_id: Uuid,
    flow: FlowKind,
    state: Option<SigningState>,
    tx_id: Option<SecureHash>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl SignatureCollection {
    pub fn initiator(
        flow_id: Uuid,
        flow: FlowKind,
        progress: broadcast::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            flow_id,
            flow,
            state: None,
            tx_id: None,
            progress,
        }
    }

    pub fn responder(tx_id: SecureHash, progress: broadcast::Sender<ProgressEvent>) -> Self {
        let mut machine = Self {
            flow_id: Uuid::new_v4(),
            flow: FlowKind::Responder,
            state: None,
            tx_id: Some(tx_id),
            progress,
        };
        machine.enter(SigningState::PeerValidating);
        machine
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    pub fn state(&self) -> Option<&SigningState> {
        self.state.as_ref()
    }

    pub fn tx_id(&self) -> Option<SecureHash> {
        self.tx_id
    }

    pub fn propose(&mut self, tx_id: SecureHash) -> Result<(), CollectionError> {
        self.tx_id = Some(tx_id);
        self.advance(SigningState::Proposed)
    }

    pub fn await_signatures(&mut self, pending: usize) -> Result<(), CollectionError> {
        self.advance(SigningState::AwaitingSignatures { pending })
    }

    pub fn fully_signed(&mut self) -> Result<(), CollectionError> {
        self.advance(SigningState::FullySigned)
    }

    pub fn committed(&mut self, sequence: u64) -> Result<(), CollectionError> {
        self.advance(SigningState::Committed { sequence })
    }

    pub fn signed(&mut self) -> Result<(), CollectionError> {
        self.advance(SigningState::Signed)
    }

    pub fn rejected(&mut self, reason: impl Into<String>) -> Result<(), CollectionError> {
        self.advance(SigningState::Rejected {
            reason: reason.into(),
        })
    }

    /// Fail from any non-terminal initiator state.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CollectionError> {
        self.advance(SigningState::Failed {
            reason: reason.into(),
        })
    }

    fn advance(&mut self, next: SigningState) -> Result<(), CollectionError> {
        use SigningState::*;

        let legal = match (&self.state, &next) {
            (None, Proposed) | (None, Failed { .. }) => self.flow != FlowKind::Responder,
            (Some(Proposed), AwaitingSignatures { .. }) => true,
            (Some(Proposed), FullySigned) | (Some(AwaitingSignatures { .. }), FullySigned) => true,
            (Some(FullySigned), Committed { .. }) => true,
            (Some(PeerValidating), Signed) | (Some(PeerValidating), Rejected { .. }) => true,
            (Some(current), Failed { .. }) => {
                !current.is_terminal() && self.flow != FlowKind::Responder
            }
            _ => false,
        };
        if !legal {
            return Err(CollectionError::IllegalTransition {
                from: self.state.as_ref().map_or("start", SigningState::name),
                to: next.name(),
            });
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: SigningState) {
        debug!(
            flow_id = %self.flow_id,
            flow = %self.flow,
            state = next.name(),
            "signing transition"
        );
        // No subscribers is fine.
        let _ = self.progress.send(ProgressEvent {
            flow_id: self.flow_id,
            flow: self.flow,
            state: next.clone(),
            tx_id: self.tx_id,
        });
        self.state = Some(next);
    }
}
