use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Hash of the previous block, empty for genesis
    pub previous_hash: String,

    /// Index of the block in the chain
    pub index: u64,

    /// Transactions in this block; the last one is the mining reward
    pub transactions: Vec<Transaction>,

    /// Proof of work
    pub proof: u64,

    /// Unix timestamp (seconds) of assembly
    pub timestamp: u64,
}

impl Block {
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>, proof: u64, timestamp: u64) -> Self {
        Block {
            previous_hash,
            index,
            transactions,
            proof,
            timestamp,
        }
    }

    /// The fixed first block of every chain
    pub fn genesis() -> Self {
        Block::new(0, String::new(), Vec::new(), 100, 0)
    }

    /// Calculates the hash of the block
    ///
    /// SHA-256 over a key-sorted JSON rendering of every field, with
    /// transactions reduced to their canonical triple.
    pub fn hash(&self) -> String {
        let block_data = json!({
            "previous_hash": self.previous_hash,
            "index": self.index,
            "transactions": self.transactions.iter().map(Transaction::canonical).collect::<Vec<_>>(),
            "proof": self.proof,
            "timestamp": self.timestamp,
        });

        hash_hex(block_data.to_string().as_bytes())
    }

    /// Transactions covered by the proof of work (everything except the trailing reward)
    pub fn proven_transactions(&self) -> &[Transaction] {
        match self.transactions.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

/// Hex encoded SHA-256 digest
pub fn hash_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Address, DigitalSignature};

    fn sample_block() -> Block {
        let transactions = vec![
            Transaction::new("alice".into(), "bob".into(), 2.5, DigitalSignature("sig".into())),
            Transaction::reward(Address::from("miner"), 10.0),
        ];

        Block::new(1, Block::genesis().hash(), transactions, 42, 1_700_000_000)
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();

        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "");
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.proof, 100);
        assert_eq!(genesis.timestamp, 0);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = sample_block();

        assert_eq!(block.hash(), block.clone().hash());
        assert_eq!(block.hash().len(), 64); // SHA-256 hash is 64 characters in hex
    }

    #[test]
    fn test_hash_changes_with_every_field() {
        let block = sample_block();
        let original = block.hash();

        let mut changed = block.clone();
        changed.index = 2;
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.previous_hash = "other".to_string();
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.proof += 1;
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.timestamp += 1;
        assert_ne!(changed.hash(), original);

        let mut changed = block.clone();
        changed.transactions[0].amount = 3.0;
        assert_ne!(changed.hash(), original);
    }

    #[test]
    fn test_hash_ignores_signatures() {
        let block = sample_block();
        let mut resigned = block.clone();
        resigned.transactions[0].signature = DigitalSignature("different".into());

        assert_eq!(block.hash(), resigned.hash());
    }

    #[test]
    fn test_proven_transactions_drop_reward() {
        let block = sample_block();
        assert_eq!(block.proven_transactions().len(), 1);
        assert!(Block::genesis().proven_transactions().is_empty());
    }
}
