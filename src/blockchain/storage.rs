use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Everything a node persists: chain, open pool and peers, in that order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub open_transactions: Vec<Transaction>,
    pub peers: BTreeSet<String>,
}

/// Load/save of one snapshot per node identity
pub trait PersistenceStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved for `identity` yet
    fn load(&self, identity: &Address) -> Result<Option<LedgerSnapshot>, StorageError>;

    fn save(&self, identity: &Address, snapshot: &LedgerSnapshot) -> Result<(), StorageError>;
}

/// Sled-backed store keyed by node identity
pub struct SledStore {
    /// The database instance
    db: Db,

    /// Tree holding one snapshot per identity
    snapshots: Tree,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens (or creates) the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let snapshots = db.open_tree("snapshots")?;

        Ok(Self { db, snapshots })
    }
}

impl PersistenceStore for SledStore {
    fn load(&self, identity: &Address) -> Result<Option<LedgerSnapshot>, StorageError> {
        match self.snapshots.get(identity.0.as_bytes())? {
            Some(value) => bincode::deserialize(&value)
                .map(Some)
                .map_err(|e| StorageError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn save(&self, identity: &Address, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let value = bincode::serialize(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.snapshots.insert(identity.0.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory store, used for tests and nodes run without a data directory
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<Address, LedgerSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for MemoryStore {
    fn load(&self, identity: &Address) -> Result<Option<LedgerSnapshot>, StorageError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(snapshots.get(identity).cloned())
    }

    fn save(&self, identity: &Address, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        snapshots.insert(identity.clone(), snapshot.clone());
        Ok(())
    }
}
