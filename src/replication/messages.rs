use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::Block;

/// Payload of a block broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BlockMessage {
    pub block: Block,
}

/// Body returned by peers for every broadcast
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// How a peer answered a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The peer admitted the transaction or block
    Accepted,

    /// The peer found the payload itself invalid
    Rejected(String),

    /// The peer's chain differs from ours; reconciliation is needed
    Conflict(String),
}

/// Per-peer results of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BroadcastReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    pub conflicts: Vec<String>,
    pub unreachable: Vec<String>,
}

impl BroadcastReport {
    pub fn record(&mut self, peer: String, outcome: BroadcastOutcome) {
        match outcome {
            BroadcastOutcome::Accepted => self.accepted.push(peer),
            BroadcastOutcome::Rejected(_) => self.rejected.push(peer),
            BroadcastOutcome::Conflict(_) => self.conflicts.push(peer),
        }
    }

    /// No peer refused; unreachable peers do not count
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.conflicts.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}
