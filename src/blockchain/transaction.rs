use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::crypto::{Address, CryptoError, DigitalSignature, Signer, Wallet};

/// Sender value marking a mining reward transaction
pub const MINING_SENDER: &str = "MINING";

/// Represents a transfer of coins between two addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, or `MINING` for a reward
    pub sender: Address,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Signature over the canonical triple; empty for rewards
    #[serde(default)]
    pub signature: DigitalSignature,
}

impl Transaction {
    /// Creates a transaction from its parts
    pub fn new(sender: Address, recipient: Address, amount: f64, signature: DigitalSignature) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            signature,
        }
    }

    /// Creates a signed transaction from the wallet to `recipient`
    pub fn signed(
        wallet: &Wallet,
        signer: &dyn Signer,
        recipient: Address,
        amount: f64,
    ) -> Result<Self, CryptoError> {
        let message = canonical_bytes(wallet.address(), &recipient, amount);
        let signature = wallet.sign(signer, &message)?;

        Ok(Transaction::new(wallet.address().clone(), recipient, amount, signature))
    }

    /// Creates an unsigned mining reward transaction
    pub fn reward(recipient: Address, amount: f64) -> Self {
        Transaction::new(Address::from(MINING_SENDER), recipient, amount, DigitalSignature::empty())
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender.0 == MINING_SENDER
    }

    /// The `(sender, recipient, amount)` triple as a JSON value.
    ///
    /// The signature is never part of the signed or hashed payload.
    pub fn canonical(&self) -> serde_json::Value {
        canonical_value(&self.sender, &self.recipient, self.amount)
    }

    /// Bytes that get signed and verified
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.sender, &self.recipient, self.amount)
    }
}

fn canonical_value(sender: &Address, recipient: &Address, amount: f64) -> serde_json::Value {
    json!({
        "sender": sender.0,
        "recipient": recipient.0,
        "amount": amount,
    })
}

fn canonical_bytes(sender: &Address, recipient: &Address, amount: f64) -> Vec<u8> {
    canonical_value(sender, recipient, amount).to_string().into_bytes()
}

/// Serializes a transaction list via each entry's canonical triple
pub fn canonical_list(transactions: &[Transaction]) -> String {
    serde_json::Value::Array(transactions.iter().map(Transaction::canonical).collect()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Ed25519Signer;

    #[test]
    fn test_signed_transaction_verifies() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let transaction =
            Transaction::signed(&sender, &Ed25519Signer, recipient.address().clone(), 10.5).unwrap();

        assert_eq!(transaction.sender, *sender.address());
        assert_eq!(transaction.amount, 10.5);
        assert!(!transaction.signature.is_empty());
        assert!(Ed25519Signer.verify(&transaction.sender, &transaction.canonical_bytes(), &transaction.signature));
    }

    #[test]
    fn test_reward_transaction() {
        let miner = Wallet::new();
        let transaction = Transaction::reward(miner.address().clone(), 10.0);

        assert_eq!(transaction.sender.0, "MINING");
        assert!(transaction.is_reward());
        assert!(transaction.signature.is_empty());
    }

    #[test]
    fn test_canonical_form_excludes_signature() {
        let mut a = Transaction::new("alice".into(), "bob".into(), 3.0, DigitalSignature("one".into()));
        let b = Transaction::new("alice".into(), "bob".into(), 3.0, DigitalSignature("two".into()));
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());

        a.amount = 4.0;
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_wire_shape() {
        let transaction = Transaction::new("alice".into(), "bob".into(), 1.5, DigitalSignature("sig".into()));
        let value = serde_json::to_value(&transaction).unwrap();

        assert_eq!(
            value,
            json!({"sender": "alice", "recipient": "bob", "amount": 1.5, "signature": "sig"})
        );
    }
}
