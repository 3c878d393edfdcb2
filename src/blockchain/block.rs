use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::GENESIS_TIMESTAMP;
use super::pow::{CancelToken, Miner, MiningOutcome, seal};
use crate::crypto::SignatureEngine;
use crate::hash::Hash256;
use crate::transaction::Transaction;

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: i64, // Unix timestamp in milliseconds (UTC)
    pub transactions: Vec<Transaction>,
    pub previous_hash: Hash256,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: Hash256, // Cached hash of the block
}

impl Block {
    /// Create the genesis block (first block in the chain).
    /// Fixed content, so every ledger starts from the same hash.
    pub fn genesis() -> Self {
        Self::new_with_timestamp(Hash256::ZERO, Vec::new(), GENESIS_TIMESTAMP)
    }

    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(previous_hash: Hash256, transactions: Vec<Transaction>) -> Self {
        Self::new_with_timestamp(previous_hash, transactions, Utc::now().timestamp_millis())
    }

    pub fn new_with_timestamp(
        previous_hash: Hash256,
        transactions: Vec<Transaction>,
        timestamp: i64,
    ) -> Self {
        let mut block = Self {
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: Hash256::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Hasher primed with everything except the nonce, which goes last.
    /// Each transaction contributes its digest and its signature.
    pub(crate) fn pow_base(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:", self.timestamp, self.previous_hash).as_bytes());
        for tx in &self.transactions {
            let sig = tx.signature.as_deref().unwrap_or("");
            hasher.update(format!("{}/{};", tx.compute_digest(), sig).as_bytes());
        }
        hasher.update(b":");
        hasher
    }

    /// Compute the SHA-256 hash of this block from its fields
    /// (excluding the `hash` field itself).
    pub fn compute_hash(&self) -> Hash256 {
        seal(&self.pow_base(), self.nonce)
    }

    /// Perform Proof-of-Work starting from the current nonce until the hash
    /// has `difficulty` leading zero hex digits.
    ///
    /// On cancellation the block keeps the resume point as its nonce, so
    /// calling `mine` again continues where the last search stopped.
    pub fn mine(&mut self, miner: &Miner, difficulty: u32, cancel: &CancelToken) -> MiningOutcome {
        let outcome = miner.search(&self.pow_base(), self.nonce, difficulty, cancel);
        match outcome {
            MiningOutcome::Found(solution) => {
                self.nonce = solution.nonce;
                self.hash = solution.hash;
            }
            MiningOutcome::Cancelled { resume_from, .. } => {
                self.nonce = resume_from;
                self.hash = self.compute_hash();
            }
        }
        outcome
    }

    /// True if the stored hash satisfies the PoW difficulty.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.hash.meets_difficulty(difficulty)
    }

    /// Position of the first transaction that is invalid or malformed.
    pub fn first_invalid_transaction(&self, engine: &SignatureEngine) -> Option<usize> {
        self.transactions.iter().position(|tx| match tx.is_valid(engine) {
            Ok(valid) => !valid,
            Err(e) => {
                debug!("transaction treated as invalid: {e}");
                true
            }
        })
    }

    pub fn has_valid_transactions(&self, engine: &SignatureEngine) -> bool {
        self.first_invalid_transaction(engine).is_none()
    }
}
