use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A public key string identifying a sender, recipient or node (base58 encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    /// Converts the address back into a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&key_bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Ok(Address(s.to_string()))
    }
}

/// A detached signature over a transaction's canonical triple (base58 encoded).
///
/// Reward transactions carry the empty signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    pub fn empty() -> Self {
        DigitalSignature(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// The raw sign/verify capability the ledger consults.
///
/// The ledger only ever calls `verify`; `sign` is used by whoever holds the keys.
pub trait Signer: Send + Sync {
    fn sign(&self, secret_key: &[u8], message: &[u8]) -> Result<DigitalSignature, CryptoError>;

    fn verify(&self, public_key: &Address, message: &[u8], signature: &DigitalSignature) -> bool;
}

/// Ed25519 signatures with base58 encoded public keys as addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl Signer for Ed25519Signer {
    fn sign(&self, secret_key: &[u8], message: &[u8]) -> Result<DigitalSignature, CryptoError> {
        let key_bytes: [u8; 32] = secret_key.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        let signing_key = SigningKey::from_bytes(&key_bytes);
        Ok(DigitalSignature::from_signature(&signing_key.sign(message)))
    }

    fn verify(&self, public_key: &Address, message: &[u8], signature: &DigitalSignature) -> bool {
        let (Ok(public_key), Ok(signature)) = (public_key.to_public_key(), signature.to_signature()) else {
            return false;
        };

        public_key.verify(message, &signature).is_ok()
    }
}

/// Holds a node's key pair. Its address doubles as the node identity.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    /// Creates a wallet from a hex encoded secret key
    pub fn from_hex(secret_key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;
        Self::from_secret_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());
        Wallet { signing_key, address }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs a message through the given signer
    pub fn sign(&self, signer: &dyn Signer, message: &[u8]) -> Result<DigitalSignature, CryptoError> {
        signer.sign(&self.export_secret_key(), message)
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
