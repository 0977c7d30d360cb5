// Replication module
//
// Peer-to-peer propagation of transactions and blocks, and the
// longest-valid-chain reconciliation between diverged nodes:
// - Wire messages and broadcast outcome classification
// - Peer transport (HTTP)
// - The node orchestrating ledger calls and broadcasts

pub mod messages;
pub mod node;
pub mod transport;

pub use messages::{BlockMessage, BroadcastOutcome, BroadcastReport};
pub use node::{Node, NodeError, Origin};
pub use transport::{HttpTransport, PeerTransport, TransportError};
