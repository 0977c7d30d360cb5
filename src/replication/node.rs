use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use super::messages::{BroadcastOutcome, BroadcastReport};
use super::transport::{PeerTransport, TransportError};
use crate::blockchain::crypto::CryptoError;
use crate::blockchain::ledger::{Ledger, LedgerError};
use crate::blockchain::verification::{self, ValidationError};
use crate::blockchain::{Address, Block, Transaction, Wallet};

/// Errors surfaced by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Where a transaction entered this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted by the local operator; broadcast to peers after admission
    Local,

    /// Relayed by a peer; never re-broadcast
    Peer,
}

/// Result of admitting a transaction
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitReport {
    pub transaction: Transaction,
    pub broadcast: BroadcastReport,
}

/// Result of mining a block
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MineReport {
    pub block: Block,
    pub broadcast: BroadcastReport,

    /// Whether a peer conflict led to adopting a longer chain
    pub chain_replaced: bool,
}

/// A ledger wired to its peers.
///
/// Cheap to clone; clones share the ledger and the resolution flag.
#[derive(Clone)]
pub struct Node {
    ledger: Arc<Ledger>,

    /// Signs locally originated transactions
    wallet: Arc<Wallet>,

    transport: Arc<dyn PeerTransport>,

    /// Set when a peer reported divergence; cleared by `resolve_conflicts`
    needs_resolution: Arc<AtomicBool>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ledger", &self.ledger)
            .field("needs_resolution", &self.needs_resolution())
            .finish()
    }
}

impl Node {
    /// `wallet` must own the ledger's identity for local submissions to be fundable
    pub fn new(ledger: Arc<Ledger>, wallet: Wallet, transport: Arc<dyn PeerTransport>) -> Self {
        Node {
            ledger,
            wallet: Arc::new(wallet),
            transport,
            needs_resolution: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn address(&self) -> &Address {
        self.wallet.address()
    }

    pub fn needs_resolution(&self) -> bool {
        self.needs_resolution.load(Ordering::SeqCst)
    }

    fn flag_conflict(&self) {
        self.needs_resolution.store(true, Ordering::SeqCst);
    }

    /// Signs a transfer from this node's wallet and submits it
    pub async fn submit_local(&self, recipient: Address, amount: f64) -> Result<SubmitReport, NodeError> {
        let transaction = Transaction::signed(&self.wallet, self.ledger.signer(), recipient, amount)?;
        self.submit(transaction, Origin::Local).await
    }

    /// Admits a transaction and, for local ones, broadcasts it.
    ///
    /// Admission is not rolled back when peers refuse; check
    /// `broadcast.is_clean()` to learn whether the network agreed.
    /// Peers may not hand us mining rewards; those only come out of `mine`.
    pub async fn submit(&self, transaction: Transaction, origin: Origin) -> Result<SubmitReport, NodeError> {
        if origin == Origin::Peer && transaction.is_reward() {
            return Err(LedgerError::from(ValidationError::UnsolicitedReward).into());
        }
        self.ledger.add_transaction(transaction.clone())?;

        let broadcast = match origin {
            Origin::Local => self.broadcast_transaction(&transaction).await,
            Origin::Peer => BroadcastReport::default(),
        };
        if broadcast.has_conflicts() {
            self.flag_conflict();
        }

        Ok(SubmitReport { transaction, broadcast })
    }

    /// Handles a transaction broadcast by a peer
    pub async fn receive_transaction(&self, transaction: Transaction) -> BroadcastOutcome {
        if self.needs_resolution() {
            return BroadcastOutcome::Conflict("Local chain is awaiting conflict resolution".to_string());
        }

        match self.submit(transaction, Origin::Peer).await {
            Ok(_) => BroadcastOutcome::Accepted,
            Err(err) => BroadcastOutcome::Rejected(err.to_string()),
        }
    }

    /// Mines a block off the async executor and broadcasts it.
    ///
    /// A conflict reported by any peer triggers conflict resolution.
    pub async fn mine(&self) -> Result<MineReport, NodeError> {
        let ledger = self.ledger.clone();
        let block = tokio::task::spawn_blocking(move || ledger.mine())
            .await
            .map_err(|e| NodeError::Task(e.to_string()))??;

        let broadcast = self.broadcast_block(&block).await;

        let chain_replaced = if broadcast.has_conflicts() {
            self.flag_conflict();
            self.resolve_conflicts().await
        } else {
            false
        };

        Ok(MineReport {
            block,
            broadcast,
            chain_replaced,
        })
    }

    /// Handles a block broadcast by a peer.
    ///
    /// A block from further ahead than our tip means we are behind, so
    /// resolution is scheduled here as well as reported back.
    pub async fn receive_block(&self, block: Block) -> BroadcastOutcome {
        let ledger = self.ledger.clone();
        let result = match tokio::task::spawn_blocking(move || ledger.add_block(block)).await {
            Ok(result) => result,
            Err(err) => return BroadcastOutcome::Rejected(err.to_string()),
        };

        match result {
            Ok(()) => BroadcastOutcome::Accepted,
            Err(LedgerError::ChainDiverged { local_height, block_index }) => {
                if block_index > local_height {
                    self.flag_conflict();
                    self.schedule_resolution();
                }
                BroadcastOutcome::Conflict(format!(
                    "Block {} does not extend local chain of height {}",
                    block_index, local_height
                ))
            }
            Err(err) => BroadcastOutcome::Rejected(err.to_string()),
        }
    }

    /// Runs `resolve_conflicts` in the background
    pub fn schedule_resolution(&self) {
        let node = self.clone();
        tokio::spawn(async move {
            node.resolve_conflicts().await;
        });
    }

    /// Adopts the longest valid chain among all reachable peers.
    ///
    /// Ties keep the local chain. Returns whether the chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let peers = self.ledger.peers();
        let fetches = peers.iter().map(|peer| self.transport.fetch_chain(peer));
        let results = join_all(fetches).await;

        let mut best: Option<Vec<Block>> = None;
        let mut best_len = self.ledger.height();

        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(chain) if !verification::verify_chain(&chain) => {
                    warn!("Discarding invalid chain of length {} from {}", chain.len(), peer);
                }
                Ok(chain) => {
                    if chain.len() > best_len {
                        best_len = chain.len();
                        best = Some(chain);
                    }
                }
                Err(err) => warn!("Skipping peer during resolution: {}", err),
            }
        }

        let replaced = best.map_or(false, |chain| self.ledger.replace_chain(chain));
        self.needs_resolution.store(false, Ordering::SeqCst);

        if replaced {
            info!("Conflict resolved by adopting a chain of length {}", best_len);
        } else {
            info!("Conflict resolution kept the local chain");
        }
        replaced
    }

    async fn broadcast_transaction(&self, transaction: &Transaction) -> BroadcastReport {
        let peers = self.ledger.peers();
        let sends = peers.iter().map(|peer| self.transport.send_transaction(peer, transaction));
        let results = join_all(sends).await;

        Self::collect(peers, results)
    }

    async fn broadcast_block(&self, block: &Block) -> BroadcastReport {
        let peers = self.ledger.peers();
        let sends = peers.iter().map(|peer| self.transport.send_block(peer, block));
        let results = join_all(sends).await;

        Self::collect(peers, results)
    }

    fn collect(peers: Vec<String>, results: Vec<Result<BroadcastOutcome, TransportError>>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (peer, result) in peers.into_iter().zip(results) {
            match result {
                Ok(outcome) => report.record(peer, outcome),
                Err(err) => {
                    warn!("Skipping peer: {}", err);
                    report.unreachable.push(peer);
                }
            }
        }

        report
    }
}
