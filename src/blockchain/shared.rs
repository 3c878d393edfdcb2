use log::{debug, warn};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::Ledger;
use super::pow::{CancelToken, MiningOutcome};
use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use crate::hash::Hash256;
use crate::transaction::Transaction;

/// Thread-safe handle to a [`Ledger`].
///
/// Only one mine runs at a time (the mining gate). The nonce search itself
/// runs with no ledger lock held, so balances and submissions stay
/// available while a block is being mined.
#[derive(Debug, Default)]
pub struct SharedLedger {
    ledger: RwLock<Ledger>,
    mining: Mutex<()>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            mining: Mutex::new(()),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a read-only view of the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        self.write_guard().submit_transaction(tx)
    }

    pub fn balance_of(&self, address: &Address) -> i128 {
        self.read_guard().balance_of(address)
    }

    pub fn is_valid(&self) -> bool {
        self.read_guard().is_valid()
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    /// Snapshot pending → mine → append → reseed, serialized against every
    /// other `mine` call on this handle. Returns the new block's hash.
    pub fn mine(&self, reward_address: &Address, cancel: &CancelToken) -> Result<Hash256> {
        let _gate = self.mining.lock().unwrap_or_else(PoisonError::into_inner);

        let (mut candidate, miner, difficulty) = {
            let ledger = self.read_guard();
            (
                ledger.prepare_candidate(),
                ledger.miner().clone(),
                ledger.difficulty(),
            )
        };
        debug!(
            "mining candidate on {} with {} txs",
            candidate.block.previous_hash, candidate.included
        );

        match candidate.block.mine(&miner, difficulty, cancel) {
            MiningOutcome::Found(_) => {
                let mut ledger = self.write_guard();
                let hash = ledger.commit(candidate, reward_address)?.hash;
                Ok(hash)
            }
            MiningOutcome::Cancelled { attempts, .. } => {
                warn!("mining cancelled after {attempts} attempts; ledger unchanged");
                Err(LedgerError::MiningCancelled { attempts })
            }
        }
    }
}
