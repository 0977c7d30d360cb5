use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use super::block::hash_hex;
use super::transaction::{canonical_list, Transaction};

/// Number of leading hex zeros a valid guess hash must start with
pub const DIFFICULTY: usize = 2;

/// Cooperative cancellation flag for a running search.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both tokens share one flag
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Checks `proof` against the transactions and previous hash it commits to
pub fn is_valid(transactions: &[Transaction], previous_hash: &str, proof: u64) -> bool {
    is_valid_with_difficulty(transactions, previous_hash, proof, DIFFICULTY)
}

pub fn is_valid_with_difficulty(transactions: &[Transaction], previous_hash: &str, proof: u64, difficulty: usize) -> bool {
    let guess = format!("{}{}{}", canonical_list(transactions), previous_hash, proof);
    let guess_hash = hash_hex(guess.as_bytes());

    guess_hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Searches `0, 1, 2, ...` for the first valid proof.
///
/// Returns `None` only if the token is cancelled before a proof is found.
pub fn solve(transactions: &[Transaction], previous_hash: &str, cancel: &CancelToken) -> Option<u64> {
    let mut proof = 0u64;

    loop {
        if cancel.is_cancelled() {
            debug!("Proof of work search cancelled at proof {}", proof);
            return None;
        }

        if is_valid(transactions, previous_hash, proof) {
            debug!("Found proof {} for previous hash {}", proof, previous_hash);
            return Some(proof);
        }

        proof += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::DigitalSignature;

    fn sample_transactions() -> Vec<Transaction> {
        vec![Transaction::new("alice".into(), "bob".into(), 4.0, DigitalSignature("sig".into()))]
    }

    #[test]
    fn test_solve_produces_valid_proof() {
        let transactions = sample_transactions();
        let proof = solve(&transactions, "abc", &CancelToken::new()).unwrap();

        assert!(is_valid(&transactions, "abc", proof));
    }

    #[test]
    fn test_solve_finds_smallest_proof() {
        let transactions = sample_transactions();
        let proof = solve(&transactions, "abc", &CancelToken::new()).unwrap();

        assert!((0..proof).all(|p| !is_valid(&transactions, "abc", p)));
        assert_eq!(solve(&transactions, "abc", &CancelToken::new()), Some(proof));
    }

    #[test]
    fn test_non_solution_is_invalid() {
        let transactions = sample_transactions();
        let proof = (0u64..).find(|p| !is_valid(&transactions, "abc", *p)).unwrap();

        assert!(!is_valid(&transactions, "abc", proof));
    }

    #[test]
    fn test_zero_difficulty_accepts_anything() {
        assert!(is_valid_with_difficulty(&[], "", 7, 0));
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();

        assert!(token.is_cancelled());
        assert_eq!(solve(&sample_transactions(), "abc", &token), None);
    }
}
