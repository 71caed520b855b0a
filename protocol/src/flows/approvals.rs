//! Operator consent for flows other parties start.
//!
//! A node countersigns as the owner of an input, or as the issuer of new
//! cash, only for flows its operator approved beforehand. An approval names
//! the flow id and the party allowed to run it, and holds until revoked.

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::identity::Party;

#[derive(Default)]
pub struct FlowApprovals {
    granted: DashMap<Uuid, Party>,
}

impl FlowApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `initiator` spend or mint our cash in flow `flow_id`. Approving
    /// the same flow again replaces the initiator.
    pub fn approve(&self, flow_id: Uuid, initiator: Party) {
        info!(flow_id = %flow_id, initiator = %initiator, "flow approved");
        self.granted.insert(flow_id, initiator);
    }

    pub fn revoke(&self, flow_id: &Uuid) -> bool {
        self.granted.remove(flow_id).is_some()
    }

    pub fn is_approved(&self, flow_id: &Uuid, initiator: &Party) -> bool {
        self.granted
            .get(flow_id)
            .map_or(false, |entry| entry.value() == initiator)
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}
