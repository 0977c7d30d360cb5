use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{error, info, warn};
use thiserror::Error;

use super::block::Block;
use super::crypto::{Address, Signer};
use super::proof_of_work::{self, CancelToken};
use super::storage::{LedgerSnapshot, PersistenceStore};
use super::transaction::Transaction;
use super::verification::{self, ValidationError};

/// Amount credited to the miner of each block
pub const MINING_REWARD: f64 = 10.0;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid proof of work in block {index}")]
    InvalidProof { index: u64 },

    #[error("Block {index} does not link to the local chain tip")]
    PreviousHashMismatch { index: u64 },

    #[error("Block {block_index} does not extend the local chain of height {local_height}")]
    ChainDiverged { local_height: u64, block_index: u64 },

    #[error("Open transaction from {0} has an invalid signature")]
    InvalidOpenTransaction(Address),

    #[error("Mining was cancelled")]
    MiningCancelled,

    #[error("Chain tip changed while mining")]
    StaleTip,
}

impl LedgerError {
    /// Refusals caused by the submitted transaction itself
    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation(_))
    }

    /// Refusals meaning the sender's chain and ours have diverged
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::ChainDiverged { .. })
    }
}

#[derive(Debug, Clone)]
struct LedgerState {
    chain: Vec<Block>,
    open_transactions: Vec<Transaction>,
    peers: BTreeSet<String>,
}

impl LedgerState {
    fn genesis(peers: BTreeSet<String>) -> Self {
        LedgerState {
            chain: vec![Block::genesis()],
            open_transactions: Vec::new(),
            peers,
        }
    }

    fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    fn contains_committed(&self, transaction: &Transaction) -> bool {
        self.chain.iter().any(|block| block.transactions.contains(transaction))
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.clone(),
            open_transactions: self.open_transactions.clone(),
            peers: self.peers.clone(),
        }
    }
}

/// Computes `address`'s spendable balance.
///
/// Committed receipts minus committed sends minus pending sends. Pending
/// receipts do not count until confirmed.
pub fn balance_of(chain: &[Block], open_transactions: &[Transaction], address: &Address) -> f64 {
    let committed = chain.iter().flat_map(|block| block.transactions.iter());

    let received: f64 = committed
        .clone()
        .filter(|tx| tx.recipient == *address)
        .map(|tx| tx.amount)
        .sum();
    let sent: f64 = committed.filter(|tx| tx.sender == *address).map(|tx| tx.amount).sum();
    let pending: f64 = open_transactions
        .iter()
        .filter(|tx| tx.sender == *address)
        .map(|tx| tx.amount)
        .sum();

    received - sent - pending
}

/// A node's chain, open transaction pool and peer set.
///
/// All mutations take the write lock; reads share the read lock.
pub struct Ledger {
    /// Reward destination and persistence key
    identity: Address,

    state: RwLock<LedgerState>,

    signer: Arc<dyn Signer>,

    store: Arc<dyn PersistenceStore>,

    /// Tokens of proof-of-work searches currently running
    searches: Mutex<Vec<CancelToken>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("identity", &self.identity).finish()
    }
}

impl Ledger {
    /// Loads the ledger persisted for `identity`, falling back to genesis
    /// when the store is empty, unreadable or holds an invalid chain.
    pub fn open(identity: Address, signer: Arc<dyn Signer>, store: Arc<dyn PersistenceStore>) -> Self {
        let state = match store.load(&identity) {
            Ok(Some(snapshot)) => Self::restore(snapshot),
            Ok(None) => {
                info!("No persisted ledger for {}, starting from genesis", identity);
                LedgerState::genesis(BTreeSet::new())
            }
            Err(err) => {
                warn!("Failed to load ledger from storage: {}", err);
                warn!("Starting from genesis in memory");
                LedgerState::genesis(BTreeSet::new())
            }
        };

        Ledger {
            identity,
            state: RwLock::new(state),
            signer,
            store,
            searches: Mutex::new(Vec::new()),
        }
    }

    fn restore(snapshot: LedgerSnapshot) -> LedgerState {
        if let Some(index) = verification::first_invalid_block(&snapshot.chain) {
            warn!("Persisted chain is invalid at block {}, discarding it", index);
            return LedgerState::genesis(snapshot.peers);
        }

        let mut state = LedgerState {
            chain: snapshot.chain,
            open_transactions: Vec::new(),
            peers: snapshot.peers,
        };
        let still_open: Vec<Transaction> = snapshot
            .open_transactions
            .into_iter()
            .filter(|tx| !state.contains_committed(tx))
            .collect();
        state.open_transactions = still_open;

        info!(
            "Loaded ledger with {} blocks, {} open transactions and {} peers",
            state.chain.len(),
            state.open_transactions.len(),
            state.peers.len()
        );
        state
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &LedgerState) {
        if let Err(err) = self.store.save(&self.identity, &state.snapshot()) {
            warn!("Failed to persist ledger, continuing in memory: {}", err);
        }
    }

    fn cancel_searches(&self) {
        let searches = self.searches.lock().unwrap_or_else(PoisonError::into_inner);
        for token in searches.iter() {
            token.cancel();
        }
    }

    fn check_chain(state: &LedgerState) {
        if let Some(index) = verification::first_invalid_block(&state.chain) {
            error!("Local chain failed verification at block {}", index);
        }
    }

    pub fn identity(&self) -> &Address {
        &self.identity
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    /// Gets a copy of the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.read_state().chain.clone()
    }

    /// Number of blocks, genesis included
    pub fn height(&self) -> usize {
        self.read_state().chain.len()
    }

    pub fn last_block(&self) -> Block {
        self.read_state().last_block().clone()
    }

    /// Gets a copy of all pending transactions
    pub fn open_transactions(&self) -> Vec<Transaction> {
        self.read_state().open_transactions.clone()
    }

    pub fn peers(&self) -> Vec<String> {
        self.read_state().peers.iter().cloned().collect()
    }

    /// Spendable balance of `address`
    pub fn balance(&self, address: &Address) -> f64 {
        let state = self.read_state();
        balance_of(&state.chain, &state.open_transactions, address)
    }

    /// Checks the local chain
    pub fn is_valid(&self) -> bool {
        verification::verify_chain(&self.read_state().chain)
    }

    /// Signature-only check over the open pool
    pub fn verify_open_transactions(&self) -> bool {
        verification::verify_transactions(&self.read_state().open_transactions, self.signer())
    }

    /// Adds a peer address; returns false if it was already known
    pub fn add_peer(&self, peer: &str) -> bool {
        let mut state = self.write_state();
        let added = state.peers.insert(peer.to_string());
        if added {
            info!("Added peer {}", peer);
            self.persist(&state);
        }
        added
    }

    /// Removes a peer address; returns false if it was unknown
    pub fn remove_peer(&self, peer: &str) -> bool {
        let mut state = self.write_state();
        let removed = state.peers.remove(peer);
        if removed {
            info!("Removed peer {}", peer);
            self.persist(&state);
        }
        removed
    }

    /// Admits a transaction to the open pool.
    ///
    /// The sender's pending sends count against its balance, so the same
    /// funds cannot be spent twice before mining. A transaction already
    /// pending or committed is refused, so a signed transfer cannot be replayed.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let mut state = self.write_state();

        if state.open_transactions.contains(&transaction) || state.contains_committed(&transaction) {
            return Err(ValidationError::AlreadyKnown.into());
        }

        let available = balance_of(&state.chain, &state.open_transactions, &transaction.sender);
        verification::verify_admission(&transaction, self.signer(), available)?;

        info!(
            "Admitted transaction of {} from {} to {}",
            transaction.amount, transaction.sender, transaction.recipient
        );
        state.open_transactions.push(transaction);
        self.persist(&state);

        Ok(())
    }

    /// Mines a block over the current open pool
    pub fn mine(&self) -> Result<Block, LedgerError> {
        self.mine_with(&CancelToken::new())
    }

    /// Mines a block, giving up when `cancel` fires or a competing block
    /// is accepted mid-search.
    ///
    /// The search runs without holding the lock. Transactions admitted
    /// meanwhile stay pending for the next block.
    pub fn mine_with(&self, cancel: &CancelToken) -> Result<Block, LedgerError> {
        let (previous_hash, transactions) = {
            let state = self.read_state();
            (state.last_block().hash(), state.open_transactions.clone())
        };

        self.searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cancel.clone());
        let proof = proof_of_work::solve(&transactions, &previous_hash, cancel);
        self.searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|token| !token.same_as(cancel));

        let proof = proof.ok_or(LedgerError::MiningCancelled)?;

        if let Some(forged) = transactions
            .iter()
            .find(|tx| !verification::verify_signature_only(tx, self.signer()))
        {
            return Err(LedgerError::InvalidOpenTransaction(forged.sender.clone()));
        }

        let mut state = self.write_state();
        if state.last_block().hash() != previous_hash {
            return Err(LedgerError::StaleTip);
        }

        let mut block_transactions = transactions;
        block_transactions.push(Transaction::reward(self.identity.clone(), MINING_REWARD));

        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let block = Block::new(state.chain.len() as u64, previous_hash, block_transactions, proof, timestamp);

        state.chain.push(block.clone());
        state
            .open_transactions
            .retain(|tx| !block.transactions.contains(tx));
        self.persist(&state);
        Self::check_chain(&state);

        info!("Mined block {} with proof {}", block.index, block.proof);
        Ok(block)
    }

    /// Appends a block received from a peer.
    ///
    /// Its proof must hold and it must sit right on our tip. Pooled transactions
    /// it embeds leave the pool.
    pub fn add_block(&self, block: Block) -> Result<(), LedgerError> {
        if !proof_of_work::is_valid(block.proven_transactions(), &block.previous_hash, block.proof) {
            return Err(LedgerError::InvalidProof { index: block.index });
        }

        let mut state = self.write_state();

        let local_height = state.chain.len() as u64;
        if block.index != local_height {
            return Err(LedgerError::ChainDiverged {
                local_height,
                block_index: block.index,
            });
        }
        if block.previous_hash != state.last_block().hash() {
            return Err(LedgerError::PreviousHashMismatch { index: block.index });
        }

        info!("Accepted block {} from peer", block.index);
        state
            .open_transactions
            .retain(|tx| !block.transactions.contains(tx));
        state.chain.push(block);
        self.persist(&state);
        Self::check_chain(&state);
        drop(state);

        self.cancel_searches();
        Ok(())
    }

    /// Adopts `candidate` if it is valid and strictly longer than the local
    /// chain. Returns whether the chain was replaced.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        if !verification::verify_chain(&candidate) {
            warn!("Refusing to adopt an invalid chain of length {}", candidate.len());
            return false;
        }

        let mut state = self.write_state();
        if candidate.len() <= state.chain.len() {
            return false;
        }

        info!(
            "Replacing local chain of length {} with chain of length {}",
            state.chain.len(),
            candidate.len()
        );
        state.chain = candidate;
        let pending = std::mem::take(&mut state.open_transactions);
        let still_open: Vec<Transaction> = pending
            .into_iter()
            .filter(|tx| !state.contains_committed(tx))
            .collect();
        state.open_transactions = still_open;
        self.persist(&state);
        drop(state);

        self.cancel_searches();
        true
    }
}
