// Blockchain module
//
// This module contains the ledger core including:
// - Block and transaction structures
// - Hashing and the proof of work algorithm
// - Stateless chain and transaction verification
// - The signer capability and wallet
// - Persistence adapter
// - The ledger owning chain, open transactions and peers

pub mod block;
pub mod crypto;
pub mod ledger;
pub mod proof_of_work;
pub mod storage;
pub mod transaction;
pub mod verification;

// Re-export main components for easier access
pub use block::Block;
pub use crypto::{Address, DigitalSignature, Ed25519Signer, Signer, Wallet};
pub use ledger::{Ledger, LedgerError, MINING_REWARD};
pub use storage::{LedgerSnapshot, MemoryStore, PersistenceStore, SledStore};
pub use transaction::{Transaction, MINING_SENDER};
