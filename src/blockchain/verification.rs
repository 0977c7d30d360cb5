//! Stateless checks over explicit chains, transactions and balances.
//!
//! Nothing here reads ledger state; callers pass in what is checked.

use thiserror::Error;

use super::block::Block;
use super::crypto::Signer;
use super::proof_of_work;
use super::transaction::Transaction;

/// Reasons a transaction is refused admission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Transaction is already pending or committed")]
    AlreadyKnown,

    #[error("Mining rewards are only created by the miner")]
    UnsolicitedReward,
}

/// Index of the first block breaking hash linkage, position or proof of work.
///
/// Index 0 is reported when the chain is empty or does not start at genesis.
pub fn first_invalid_block(chain: &[Block]) -> Option<usize> {
    match chain.first() {
        Some(first) if *first == Block::genesis() => {}
        _ => return Some(0),
    }

    chain.windows(2).enumerate().find_map(|(offset, pair)| {
        let (previous, block) = (&pair[0], &pair[1]);

        let linked = block.previous_hash == previous.hash() && block.index == previous.index + 1;
        let proven = proof_of_work::is_valid(block.proven_transactions(), &block.previous_hash, block.proof);

        (!linked || !proven).then_some(offset + 1)
    })
}

pub fn verify_chain(chain: &[Block]) -> bool {
    first_invalid_block(chain).is_none()
}

/// Signature check alone. Reward transactions carry no signature and always pass.
pub fn verify_signature_only(transaction: &Transaction, signer: &dyn Signer) -> bool {
    transaction.is_reward()
        || signer.verify(&transaction.sender, &transaction.canonical_bytes(), &transaction.signature)
}

/// Signature plus funds check against the sender's spendable balance.
pub fn verify_admission(
    transaction: &Transaction,
    signer: &dyn Signer,
    sender_balance: f64,
) -> Result<(), ValidationError> {
    if !transaction.amount.is_finite() || transaction.amount < 0.0 {
        return Err(ValidationError::InvalidAmount(transaction.amount));
    }

    if transaction.is_reward() {
        return Ok(());
    }

    if !verify_signature_only(transaction, signer) {
        return Err(ValidationError::InvalidSignature);
    }

    if sender_balance < transaction.amount {
        return Err(ValidationError::InsufficientFunds {
            required: transaction.amount,
            available: sender_balance,
        });
    }

    Ok(())
}

/// Signature-only check over a whole pool
pub fn verify_transactions(transactions: &[Transaction], signer: &dyn Signer) -> bool {
    transactions.iter().all(|tx| verify_signature_only(tx, signer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Address, DigitalSignature, Ed25519Signer, Wallet};
    use crate::blockchain::proof_of_work::{solve, CancelToken};

    fn mine_onto(chain: &mut Vec<Block>, transactions: Vec<Transaction>) {
        let previous_hash = chain.last().unwrap().hash();
        let proof = solve(&transactions, &previous_hash, &CancelToken::new()).unwrap();

        let mut transactions = transactions;
        transactions.push(Transaction::reward(Address::from("miner"), 10.0));
        chain.push(Block::new(chain.len() as u64, previous_hash, transactions, proof, 1));
    }

    fn sample_chain() -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        mine_onto(&mut chain, vec![]);
        mine_onto(
            &mut chain,
            vec![Transaction::new("miner".into(), "bob".into(), 3.0, DigitalSignature("sig".into()))],
        );
        mine_onto(&mut chain, vec![]);
        chain
    }

    #[test]
    fn test_genesis_only_chain_is_valid() {
        assert!(verify_chain(&[Block::genesis()]));
    }

    #[test]
    fn test_mined_chain_is_valid() {
        assert!(verify_chain(&sample_chain()));
    }

    #[test]
    fn test_empty_or_foreign_genesis_is_invalid() {
        assert_eq!(first_invalid_block(&[]), Some(0));

        let mut chain = sample_chain();
        chain[0].proof = 101;
        assert_eq!(first_invalid_block(&chain), Some(0));
    }

    #[test]
    fn test_tampered_amount_detected_at_block() {
        let mut chain = sample_chain();
        let block = &chain[2];

        // Pick a tampered amount the existing proof does not cover
        let amount = (4..)
            .map(f64::from)
            .find(|amount| {
                let mut transactions = block.proven_transactions().to_vec();
                transactions[0].amount = *amount;
                !proof_of_work::is_valid(&transactions, &block.previous_hash, block.proof)
            })
            .unwrap();

        chain[2].transactions[0].amount = amount;
        assert_eq!(first_invalid_block(&chain), Some(2));
        assert!(!verify_chain(&chain));
    }

    #[test]
    fn test_broken_link_detected() {
        let mut chain = sample_chain();
        chain[1].timestamp = 99;

        // Block 1's hash changed, so block 2 no longer links to it
        assert_eq!(first_invalid_block(&chain), Some(2));
    }

    #[test]
    fn test_misplaced_index_detected() {
        let mut chain = sample_chain();
        chain[3].index = 7;

        assert_eq!(first_invalid_block(&chain), Some(3));
    }

    #[test]
    fn test_verify_admission() {
        let sender = Wallet::new();
        let transaction =
            Transaction::signed(&sender, &Ed25519Signer, Address::from("bob"), 6.0).unwrap();

        assert_eq!(verify_admission(&transaction, &Ed25519Signer, 10.0), Ok(()));
        assert_eq!(
            verify_admission(&transaction, &Ed25519Signer, 4.0),
            Err(ValidationError::InsufficientFunds { required: 6.0, available: 4.0 })
        );

        let mut forged = transaction.clone();
        forged.amount = 1.0;
        assert_eq!(verify_admission(&forged, &Ed25519Signer, 10.0), Err(ValidationError::InvalidSignature));

        let mut negative = transaction;
        negative.amount = -1.0;
        assert_eq!(verify_admission(&negative, &Ed25519Signer, 10.0), Err(ValidationError::InvalidAmount(-1.0)));
    }

    #[test]
    fn test_reward_skips_signature_and_funds() {
        let reward = Transaction::reward(Address::from("miner"), 10.0);

        assert!(verify_signature_only(&reward, &Ed25519Signer));
        assert_eq!(verify_admission(&reward, &Ed25519Signer, 0.0), Ok(()));
    }

    #[test]
    fn test_verify_transactions() {
        let sender = Wallet::new();
        let good = Transaction::signed(&sender, &Ed25519Signer, Address::from("bob"), 1.0).unwrap();
        let mut bad = good.clone();
        bad.recipient = Address::from("mallory");

        assert!(verify_transactions(&[good.clone()], &Ed25519Signer));
        assert!(!verify_transactions(&[good, bad], &Ed25519Signer));
    }
}
