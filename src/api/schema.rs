use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::replication::BroadcastReport;

/// Request for the local transaction endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Returned when local admission succeeded but peers disagreed
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BroadcastFailureResponse {
    pub message: String,
    pub broadcast: BroadcastReport,
}

/// Balance of one address
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/// Validity of the local chain
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub valid: bool,

    /// First block failing verification, if any
    pub first_invalid_block: Option<usize>,

    /// Whether every open transaction carries a valid signature
    pub open_transactions_valid: bool,
}

/// Outcome of a conflict resolution run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub replaced: bool,
    pub length: usize,
}

/// Request to register a peer
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NodeRequest {
    /// Peer address, e.g. `localhost:5001`
    pub node: String,
}

/// The known peer set
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    pub nodes: Vec<String>,
}

/// This node's identity
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// Public key receiving mining rewards
    pub address: String,
    pub balance: f64,
    pub needs_resolution: bool,
}
