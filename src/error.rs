//! Error types for the ledger.

use thiserror::Error;

use crate::blockchain::InvalidBlock;
use crate::crypto::Address;

/// A required field is missing from a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("no signature in this transaction")]
    MissingSignature,
    #[error("invalid timestamp")]
    MissingTimestamp,
}

/// Submission parameters that are malformed before any crypto is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sender address is required")]
    MissingSender,
    #[error("recipient address is required")]
    MissingRecipient,
    #[error("amount must be > 0")]
    NonPositiveAmount,
    #[error("transaction was already submitted or confirmed")]
    Duplicate,
    #[error("reward transaction does not match the mining reward")]
    UnexpectedReward,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("incorrect transaction data: {0}")]
    Validation(#[from] ValidationError),

    #[error("cannot sign transactions for {expected}: key belongs to {actual}")]
    Authorization { expected: String, actual: Address },

    #[error("signature does not verify for sender {from}")]
    Authenticity { from: Address },

    #[error("insufficient funds for {address}: available {available}, requested {requested}")]
    InsufficientFunds {
        address: Address,
        available: i128,
        requested: u64,
    },

    #[error("mining cancelled after {attempts} attempts")]
    MiningCancelled { attempts: u64 },

    #[error("candidate block is stale: chain tip or pending pool moved")]
    StaleCandidate,

    #[error("rejected block: {0}")]
    Invalid(InvalidBlock),

    #[error("corrupt chain: {0}")]
    CorruptChain(InvalidBlock),

    #[error("corrupt pending pool at transaction #{position}: {source}")]
    CorruptPending {
        position: usize,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid key: {0}")]
    Key(#[from] secp256k1::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
