use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::Block;
use super::pow::{CancelToken, Miner, MiningOutcome};
use crate::config::LedgerConfig;
use crate::crypto::{Address, SignatureEngine};
use crate::error::{LedgerError, Result, ValidationError};
use crate::transaction::Transaction;

/// Why a block failed chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockFault {
    #[error("genesis block does not match the canonical genesis")]
    GenesisMismatch,
    #[error("previous_hash does not match the prior block's hash")]
    BrokenLink,
    #[error("stored hash does not match the block content")]
    HashMismatch,
    #[error("hash does not meet the difficulty target")]
    InsufficientWork,
    #[error("transaction #{position} is not validly signed")]
    InvalidTransaction { position: usize },
    #[error("transaction #{position} repeats an earlier signed transaction")]
    DuplicateTransaction { position: usize },
}

/// First failing block found while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block #{index}: {fault}")]
pub struct InvalidBlock {
    pub index: usize,
    pub fault: BlockFault,
}

/// An unmined block built from a snapshot of the pending pool.
/// `included` is how many pending transactions (from the front) it carries.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: Block,
    pub included: usize,
}

/// Serializable view of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub difficulty: u32,
    pub mining_reward: u64,
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

/// In-memory ledger with Proof-of-Work and account balances derived
/// from the confirmed chain.
#[derive(Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    config: LedgerConfig,
    engine: SignatureEngine,
    miner: Miner,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::build(LedgerConfig::default(), SignatureEngine::new())
    }
}

impl Ledger {
    /// Initialize a new ledger with a genesis block.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::with_engine(config, SignatureEngine::new())
    }

    /// Like [`Ledger::new`] with a caller-supplied signature engine.
    /// Rejects configurations `LedgerConfig::validate` refuses.
    pub fn with_engine(config: LedgerConfig, engine: SignatureEngine) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, engine))
    }

    fn build(config: LedgerConfig, engine: SignatureEngine) -> Self {
        let miner = Miner::new(config.mining_workers).with_timeout(config.mining_timeout);
        Self {
            chain: vec![Block::genesis()],
            pending: Vec::new(),
            config,
            engine,
            miner,
        }
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger should always have at least the genesis block")
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> u64 {
        self.config.mining_reward
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn engine(&self) -> &SignatureEngine {
        &self.engine
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Mine every pending transaction into a new block and queue the
    /// reward for `reward_address`. The reward is spendable only once the
    /// next block confirms it.
    pub fn mine(&mut self, reward_address: &Address) -> Result<&Block> {
        self.mine_with_cancel(reward_address, &CancelToken::new())
    }

    /// Like [`Ledger::mine`], aborting when `cancel` fires or the configured
    /// timeout elapses. An aborted mine leaves chain and pool untouched.
    pub fn mine_with_cancel(
        &mut self,
        reward_address: &Address,
        cancel: &CancelToken,
    ) -> Result<&Block> {
        let mut candidate = self.prepare_candidate();
        match candidate.block.mine(&self.miner, self.config.difficulty, cancel) {
            MiningOutcome::Found(_) => self.commit(candidate, reward_address),
            MiningOutcome::Cancelled { attempts, .. } => {
                warn!("mining cancelled after {attempts} attempts; ledger unchanged");
                Err(LedgerError::MiningCancelled { attempts })
            }
        }
    }

    /// Snapshot the pending pool and chain tip into an unmined block.
    pub fn prepare_candidate(&self) -> Candidate {
        let block = Block::new(self.last_block().hash, self.pending.clone());
        Candidate {
            block,
            included: self.pending.len(),
        }
    }

    /// Append a mined candidate and reseed the pool with the reward.
    ///
    /// Transactions submitted after the candidate was prepared stay pending,
    /// queued behind the new reward.
    pub fn commit(&mut self, candidate: Candidate, reward_address: &Address) -> Result<&Block> {
        let Candidate { block, included } = candidate;
        if block.previous_hash != self.last_block().hash
            || included > self.pending.len()
            || block.transactions[..] != self.pending[..included]
        {
            warn!("stale candidate {}: head or pool moved", block.hash);
            return Err(LedgerError::StaleCandidate);
        }

        let index = self.chain.len();
        let fault = if block.hash != block.compute_hash() {
            Some(BlockFault::HashMismatch)
        } else if !block.meets_difficulty(self.config.difficulty) {
            Some(BlockFault::InsufficientWork)
        } else {
            block
                .first_invalid_transaction(&self.engine)
                .map(|position| BlockFault::InvalidTransaction { position })
        };
        if let Some(fault) = fault {
            return Err(LedgerError::Invalid(InvalidBlock { index, fault }));
        }

        let carried = self.pending.split_off(included);
        self.pending = Vec::with_capacity(1 + carried.len());
        self.pending.push(Transaction::coinbase(
            reward_address.clone(),
            self.config.mining_reward,
        ));
        self.pending.extend(carried);

        info!(
            "MINER - sealed block #{} (hash={}, nonce={}, txs={})",
            index,
            block.hash,
            block.nonce,
            block.transactions.len()
        );
        self.chain.push(block);
        Ok(self.last_block())
    }

    /// Validate and queue a signed transaction.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<()> {
        let from = match &tx.from {
            Some(from) if !from.is_empty() => from.clone(),
            _ => return Err(ValidationError::MissingSender.into()),
        };
        if tx.to.is_empty() {
            return Err(ValidationError::MissingRecipient.into());
        }
        if tx.amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }

        if !tx.is_valid(&self.engine)? {
            warn!("rejected transaction from {from}: bad signature");
            return Err(LedgerError::Authenticity { from });
        }

        if self.is_known(&tx) {
            warn!("rejected transaction from {from}: replay of a known transaction");
            return Err(ValidationError::Duplicate.into());
        }

        let available = self.spendable_balance(&from);
        if i128::from(tx.amount) > available {
            warn!(
                "rejected transaction from {from}: amount {} > available {available}",
                tx.amount
            );
            return Err(LedgerError::InsufficientFunds {
                address: from,
                available,
                requested: tx.amount,
            });
        }

        debug!(
            "accepted {} from {} to {} (pending: {} -> {})",
            tx.amount,
            from,
            tx.to,
            self.pending.len(),
            self.pending.len() + 1
        );
        self.pending.push(tx);
        Ok(())
    }

    /// True if the same signed transaction is already confirmed or pending.
    fn is_known(&self, tx: &Transaction) -> bool {
        let digest = tx.compute_digest();
        self.chain
            .iter()
            .flat_map(|b| &b.transactions)
            .chain(&self.pending)
            .any(|seen| seen.signature == tx.signature && seen.compute_digest() == digest)
    }

    /// Balance from confirmed blocks only.
    pub fn balance_of(&self, address: &Address) -> i128 {
        let mut balance: i128 = 0;
        for tx in self.chain.iter().flat_map(|b| &b.transactions) {
            if tx.from.as_ref() == Some(address) {
                balance -= i128::from(tx.amount);
            }
            if &tx.to == address {
                balance += i128::from(tx.amount);
            }
        }
        balance
    }

    /// Sum of amounts `address` is sending in not-yet-mined transactions.
    pub fn pending_outflow(&self, address: &Address) -> u128 {
        self.pending
            .iter()
            .filter(|tx| tx.from.as_ref() == Some(address))
            .map(|tx| u128::from(tx.amount))
            .sum()
    }

    /// What `address` may still spend in a new submission.
    pub fn spendable_balance(&self, address: &Address) -> i128 {
        let confirmed = self.balance_of(address);
        if self.config.count_pending_spends {
            let outflow = i128::try_from(self.pending_outflow(address)).unwrap_or(i128::MAX);
            confirmed.saturating_sub(outflow)
        } else {
            confirmed
        }
    }

    /// Walk the whole chain: genesis, linkage, hash integrity, PoW and
    /// signatures. Reports the first failing block.
    pub fn verify(&self) -> std::result::Result<(), InvalidBlock> {
        match self.chain.first() {
            Some(genesis) if *genesis == Block::genesis() => {}
            _ => {
                return Err(InvalidBlock {
                    index: 0,
                    fault: BlockFault::GenesisMismatch,
                });
            }
        }

        let mut signed = HashSet::new();
        for (index, pair) in self.chain.windows(2).enumerate() {
            let (prev, current) = (&pair[0], &pair[1]);
            let fail = |fault| InvalidBlock {
                index: index + 1,
                fault,
            };

            if current.previous_hash != prev.hash {
                return Err(fail(BlockFault::BrokenLink));
            }
            if current.hash != current.compute_hash() {
                return Err(fail(BlockFault::HashMismatch));
            }
            if !current.meets_difficulty(self.config.difficulty) {
                return Err(fail(BlockFault::InsufficientWork));
            }
            if let Some(position) = current.first_invalid_transaction(&self.engine) {
                return Err(fail(BlockFault::InvalidTransaction { position }));
            }
            for (position, tx) in current.transactions.iter().enumerate() {
                if tx.is_coinbase() {
                    continue;
                }
                let Some(sig) = &tx.signature else { continue };
                if !signed.insert((tx.compute_digest(), sig.as_str())) {
                    return Err(fail(BlockFault::DuplicateTransaction { position }));
                }
            }
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(e) => {
                warn!("chain invalid: {e}");
                false
            }
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            difficulty: self.config.difficulty,
            mining_reward: self.config.mining_reward,
            chain: self.chain.clone(),
            pending_transactions: self.pending.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Rebuild a ledger from a snapshot. Difficulty and reward come from the
    /// snapshot; the rest of `config` applies.
    ///
    /// The chain is re-verified and the pending pool is replayed through
    /// [`Ledger::submit_transaction`]. Only a leading reward of exactly
    /// `mining_reward` is let through without a sender.
    pub fn restore(snapshot: LedgerSnapshot, mut config: LedgerConfig) -> Result<Self> {
        config.difficulty = snapshot.difficulty;
        config.mining_reward = snapshot.mining_reward;

        let mut ledger = Self::new(config)?;
        ledger.chain = snapshot.chain;
        ledger.verify().map_err(LedgerError::CorruptChain)?;

        for (position, tx) in snapshot.pending_transactions.into_iter().enumerate() {
            let restored = if tx.is_coinbase() {
                let leading_reward = position == 0 && tx.amount == ledger.config.mining_reward;
                if leading_reward && !tx.to.is_empty() {
                    ledger.pending.push(tx);
                    Ok(())
                } else {
                    Err(ValidationError::UnexpectedReward.into())
                }
            } else {
                ledger.submit_transaction(tx)
            };
            restored.map_err(|e| LedgerError::CorruptPending {
                position,
                source: Box::new(e),
            })?;
        }
        Ok(ledger)
    }

    pub fn from_json(json: &str, config: LedgerConfig) -> Result<Self> {
        let snapshot: LedgerSnapshot = serde_json::from_str(json)?;
        Self::restore(snapshot, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralError;
    use secp256k1::SecretKey;
    use std::time::Duration;

    fn key(seed: u8) -> SecretKey {
        SecretKey::from_slice(&[seed; 32]).expect("valid secret key")
    }

    fn ledger() -> Ledger {
        Ledger::new(LedgerConfig {
            difficulty: 1,
            ..LedgerConfig::default()
        })
        .unwrap()
    }

    /// Ledger where `sk` owns one confirmed reward.
    fn funded(sk: &SecretKey) -> (Ledger, Address) {
        let mut bc = ledger();
        let addr = bc.engine().address_of(sk);
        bc.mine(&addr).unwrap();
        bc.mine(&addr).unwrap();
        (bc, addr)
    }

    fn transfer(bc: &Ledger, sk: &SecretKey, to: &Address, amount: u64) -> Transaction {
        let mut tx = Transaction::new(bc.engine().address_of(sk), to.clone(), amount);
        tx.sign(bc.engine(), sk).unwrap();
        tx
    }

    #[test]
    fn starts_with_genesis_only() {
        let bc = Ledger::default();
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.difficulty(), 2);
        assert_eq!(bc.mining_reward(), 20);
        assert!(bc.pending_transactions().is_empty());
        assert!(bc.is_valid());
    }

    #[test]
    fn reference_scenario() {
        let mut bc = Ledger::default();
        let sk = key(1);
        let a = bc.engine().address_of(&sk);
        let b = Address::new("jeff");

        bc.mine(&a).unwrap();
        assert_eq!(bc.len(), 2);
        assert_eq!(bc.balance_of(&a), 0);

        bc.mine(&a).unwrap();
        assert_eq!(bc.len(), 3);
        assert_eq!(bc.balance_of(&a), 20);

        let tx = transfer(&bc, &sk, &b, 10);
        bc.submit_transaction(tx).unwrap();
        bc.mine(&a).unwrap();
        assert_eq!(bc.len(), 4);
        assert_eq!(bc.balance_of(&a), 30);
        assert_eq!(bc.balance_of(&b), 10);
        assert!(bc.is_valid());
    }

    #[test]
    fn mined_blocks_meet_difficulty_and_link() {
        let mut bc = Ledger::default();
        let a = Address::new("miner");
        for _ in 0..3 {
            let hash = bc.mine(&a).unwrap().hash;
            assert!(hash.to_string().starts_with("00"));
        }
        for pair in bc.chain().windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
        }
        assert!(bc.verify().is_ok());
    }

    #[test]
    fn mining_resets_pool_to_single_reward() {
        let mut bc = ledger();
        let a = Address::new("miner");
        bc.mine(&a).unwrap();
        let pending = bc.pending_transactions();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_coinbase());
        assert_eq!(pending[0].to, a);
        assert_eq!(pending[0].amount, 20);
    }

    #[test]
    fn accepted_transaction_appears_once() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        let tx = transfer(&bc, &sk, &Address::new("bob"), 5);
        bc.submit_transaction(tx.clone()).unwrap();
        let count = bc.pending_transactions().iter().filter(|p| **p == tx).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn rejects_malformed_submissions() {
        let sk = key(1);
        let (mut bc, a) = funded(&sk);

        let coinbase = Transaction::coinbase(a.clone(), 5);
        assert!(matches!(
            bc.submit_transaction(coinbase),
            Err(LedgerError::Validation(ValidationError::MissingSender))
        ));

        let no_recipient = transfer(&bc, &sk, &Address::new(""), 5);
        assert!(matches!(
            bc.submit_transaction(no_recipient),
            Err(LedgerError::Validation(ValidationError::MissingRecipient))
        ));

        let zero = transfer(&bc, &sk, &Address::new("bob"), 0);
        assert!(matches!(
            bc.submit_transaction(zero),
            Err(LedgerError::Validation(ValidationError::NonPositiveAmount))
        ));

        let unsigned = Transaction::new(a.clone(), Address::new("bob"), 5);
        assert!(matches!(
            bc.submit_transaction(unsigned),
            Err(LedgerError::Structural(StructuralError::MissingSignature))
        ));

        let mut forged = transfer(&bc, &sk, &Address::new("bob"), 5);
        forged.to = Address::new("mallory");
        assert!(matches!(
            bc.submit_transaction(forged),
            Err(LedgerError::Authenticity { .. })
        ));

        assert_eq!(bc.pending_transactions().len(), 1);
    }

    #[test]
    fn overspend_is_rejected_without_touching_pool() {
        let sk = key(1);
        let (mut bc, a) = funded(&sk);
        let before = bc.pending_transactions().to_vec();

        let tx = transfer(&bc, &sk, &Address::new("bob"), 21);
        let err = bc.submit_transaction(tx).unwrap_err();
        match err {
            LedgerError::InsufficientFunds {
                address,
                available,
                requested,
            } => {
                assert_eq!(address, a);
                assert_eq!(available, 20);
                assert_eq!(requested, 21);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bc.pending_transactions(), &before[..]);
    }

    #[test]
    fn pending_spends_count_against_new_submissions() {
        let sk = key(1);
        let (mut bc, a) = funded(&sk);
        let bob = Address::new("bob");

        bc.submit_transaction(transfer(&bc, &sk, &bob, 15)).unwrap();
        assert_eq!(bc.pending_outflow(&a), 15);
        assert_eq!(bc.spendable_balance(&a), 5);
        assert!(matches!(
            bc.submit_transaction(transfer(&bc, &sk, &bob, 10)),
            Err(LedgerError::InsufficientFunds { available: 5, .. })
        ));
        bc.submit_transaction(transfer(&bc, &sk, &bob, 5)).unwrap();
    }

    #[test]
    fn confirmed_only_policy_allows_collective_overspend() {
        let sk = key(1);
        let mut bc = Ledger::new(LedgerConfig {
            difficulty: 1,
            count_pending_spends: false,
            ..LedgerConfig::default()
        })
        .unwrap();
        let a = bc.engine().address_of(&sk);
        bc.mine(&a).unwrap();
        bc.mine(&a).unwrap();

        let bob = Address::new("bob");
        bc.submit_transaction(transfer(&bc, &sk, &bob, 15)).unwrap();
        bc.submit_transaction(transfer(&bc, &sk, &bob, 16)).unwrap();
        assert_eq!(bc.spendable_balance(&a), 20);
    }

    #[test]
    fn balance_is_linear() {
        let sk = key(1);
        let (mut bc, a) = funded(&sk);
        assert_eq!(bc.balance_of(&a), 20);

        let b = Address::new("bob");
        bc.submit_transaction(transfer(&bc, &sk, &b, 7)).unwrap();
        // pending spends do not move the confirmed balance
        assert_eq!(bc.balance_of(&a), 20);

        bc.mine(&Address::new("someone-else")).unwrap();
        assert_eq!(bc.balance_of(&a), 20 + 20 - 7);
        assert_eq!(bc.balance_of(&b), 7);
        assert_eq!(bc.balance_of(&Address::new("nobody")), 0);
    }

    #[test]
    fn tampering_is_reported_at_the_block_index() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 10))
            .unwrap();
        bc.mine(&Address::new("miner")).unwrap();
        assert!(bc.is_valid());

        let mut t = bc.snapshot();
        t.chain[3].transactions[1].amount = 1;
        let fault = Ledger::restore(t, LedgerConfig::default()).unwrap_err();
        assert!(matches!(
            fault,
            LedgerError::CorruptChain(InvalidBlock {
                index: 3,
                fault: BlockFault::HashMismatch
            })
        ));

        let mut tampered = ledger();
        tampered.chain = bc.chain.clone();
        tampered.chain[2].nonce += 1;
        assert_eq!(
            tampered.verify(),
            Err(InvalidBlock {
                index: 2,
                fault: BlockFault::HashMismatch
            })
        );

        tampered.chain = bc.chain.clone();
        tampered.chain[2].previous_hash = tampered.chain[3].hash;
        assert_eq!(
            tampered.verify(),
            Err(InvalidBlock {
                index: 2,
                fault: BlockFault::BrokenLink
            })
        );
        assert!(!tampered.is_valid());
    }

    #[test]
    fn remined_forgery_still_fails() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 10))
            .unwrap();
        bc.mine(&Address::new("miner")).unwrap();

        // Rewrite the transfer and redo the work: the signature gives it away.
        let mut block = bc.chain[3].clone();
        block.transactions[1].amount = 1;
        block.nonce = 0;
        block.mine(&Miner::default(), 1, &CancelToken::new());
        bc.chain[3] = block;
        assert_eq!(
            bc.verify(),
            Err(InvalidBlock {
                index: 3,
                fault: BlockFault::InvalidTransaction { position: 1 }
            })
        );

        // Rewriting a coinbase and re-mining breaks the next link instead.
        let (mut bc, _) = funded(&sk);
        bc.mine(&Address::new("miner")).unwrap();
        let mut block = bc.chain[2].clone();
        assert!(block.transactions[0].is_coinbase());
        block.transactions[0].amount = 1_000;
        block.nonce = 0;
        block.mine(&Miner::default(), 1, &CancelToken::new());
        bc.chain[2] = block;
        assert_eq!(
            bc.verify(),
            Err(InvalidBlock {
                index: 3,
                fault: BlockFault::BrokenLink
            })
        );
    }

    #[test]
    fn genesis_must_be_canonical() {
        let mut bc = ledger();
        bc.chain[0].timestamp += 1;
        assert_eq!(
            bc.verify(),
            Err(InvalidBlock {
                index: 0,
                fault: BlockFault::GenesisMismatch
            })
        );
    }

    #[test]
    fn under_worked_block_is_invalid() {
        let mut bc = ledger();
        bc.mine(&Address::new("miner")).unwrap();
        bc.config.difficulty = 64;
        assert_eq!(
            bc.verify(),
            Err(InvalidBlock {
                index: 1,
                fault: BlockFault::InsufficientWork
            })
        );
    }

    #[test]
    fn cancelled_mine_leaves_ledger_unchanged() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 3))
            .unwrap();
        let chain_before = bc.chain().to_vec();
        let pending_before = bc.pending_transactions().to_vec();

        let token = CancelToken::new();
        token.cancel();
        bc.config.difficulty = 64;
        let err = bc
            .mine_with_cancel(&Address::new("miner"), &token)
            .unwrap_err();
        assert!(matches!(err, LedgerError::MiningCancelled { .. }));
        assert_eq!(bc.chain(), &chain_before[..]);
        assert_eq!(bc.pending_transactions(), &pending_before[..]);
    }

    #[test]
    fn mining_timeout_cancels() {
        let mut bc = Ledger::new(LedgerConfig {
            difficulty: 64,
            mining_timeout: Some(Duration::from_millis(20)),
            ..LedgerConfig::default()
        })
        .unwrap();
        let err = bc.mine(&Address::new("miner")).unwrap_err();
        assert!(matches!(err, LedgerError::MiningCancelled { .. }));
        assert_eq!(bc.len(), 1);
        assert!(bc.pending_transactions().is_empty());
    }

    #[test]
    fn stale_candidate_is_rejected() {
        let mut bc = ledger();
        let miner = Address::new("miner");
        let mut candidate = bc.prepare_candidate();
        candidate
            .block
            .mine(&Miner::default(), 1, &CancelToken::new());
        bc.mine(&miner).unwrap();
        assert!(matches!(
            bc.commit(candidate, &miner),
            Err(LedgerError::StaleCandidate)
        ));
        assert_eq!(bc.len(), 2);
    }

    #[test]
    fn unmined_candidate_is_rejected() {
        let mut bc = ledger();
        bc.config.difficulty = 64;
        let candidate = bc.prepare_candidate();
        assert!(matches!(
            bc.commit(candidate, &Address::new("miner")),
            Err(LedgerError::Invalid(InvalidBlock {
                index: 1,
                fault: BlockFault::InsufficientWork
            }))
        ));
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn late_submissions_survive_a_commit() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        let mut candidate = bc.prepare_candidate();
        let late = transfer(&bc, &sk, &Address::new("bob"), 4);
        bc.submit_transaction(late.clone()).unwrap();

        candidate
            .block
            .mine(&Miner::default(), 1, &CancelToken::new());
        bc.commit(candidate, &Address::new("miner")).unwrap();

        let pending = bc.pending_transactions();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].is_coinbase());
        assert_eq!(pending[1], late);
    }

    #[test]
    fn json_snapshot_round_trips() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 2))
            .unwrap();
        bc.mine(&Address::new("miner")).unwrap();

        let json = bc.to_json().unwrap();
        let restored = Ledger::from_json(&json, LedgerConfig::default()).unwrap();
        assert_eq!(restored.chain(), bc.chain());
        assert_eq!(restored.pending_transactions(), bc.pending_transactions());
        assert_eq!(restored.difficulty(), 1);
        assert!(restored.is_valid());

        assert!(matches!(
            Ledger::from_json("{\"chain\": 1}", LedgerConfig::default()),
            Err(LedgerError::Serialization(_))
        ));
    }

    #[test]
    fn replayed_confirmed_transfer_is_rejected() {
        let sk = key(1);
        let (mut bc, a) = funded(&sk);
        let bob = Address::new("bob");
        let tx = transfer(&bc, &sk, &bob, 10);
        bc.submit_transaction(tx.clone()).unwrap();
        bc.mine(&a).unwrap();
        bc.mine(&a).unwrap();
        let (a_before, bob_before) = (bc.balance_of(&a), bc.balance_of(&bob));

        assert!(matches!(
            bc.submit_transaction(tx),
            Err(LedgerError::Validation(ValidationError::Duplicate))
        ));
        bc.mine(&a).unwrap();
        assert_eq!(bc.balance_of(&a), a_before + 20);
        assert_eq!(bc.balance_of(&bob), bob_before);
        assert_eq!(bc.balance_of(&bob), 10);
    }

    #[test]
    fn same_pending_transfer_is_queued_once() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        let tx = transfer(&bc, &sk, &Address::new("bob"), 3);
        bc.submit_transaction(tx.clone()).unwrap();
        assert!(matches!(
            bc.submit_transaction(tx.clone()),
            Err(LedgerError::Validation(ValidationError::Duplicate))
        ));
        let count = bc.pending_transactions().iter().filter(|p| **p == tx).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn replay_inside_the_chain_is_invalid() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 5))
            .unwrap();
        bc.mine(&Address::new("miner")).unwrap();

        let replay = bc.chain[3].transactions[1].clone();
        let mut block = Block::new(bc.last_block().hash, vec![replay]);
        block.mine(&Miner::default(), 1, &CancelToken::new());
        bc.chain.push(block);
        assert_eq!(
            bc.verify(),
            Err(InvalidBlock {
                index: 4,
                fault: BlockFault::DuplicateTransaction { position: 0 }
            })
        );
    }

    #[test]
    fn restore_rejects_forged_pending_transaction() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 5))
            .unwrap();
        let mut snapshot = bc.snapshot();
        snapshot.pending_transactions[1].amount = 500;

        match Ledger::restore(snapshot, LedgerConfig::default()).unwrap_err() {
            LedgerError::CorruptPending { position, source } => {
                assert_eq!(position, 1);
                assert!(matches!(*source, LedgerError::Authenticity { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn restore_rejects_injected_rewards() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 5))
            .unwrap();

        let mut inflated = bc.snapshot();
        inflated.pending_transactions[0].amount = 1_000_000;
        assert!(matches!(
            Ledger::restore(inflated, LedgerConfig::default()),
            Err(LedgerError::CorruptPending { position: 0, .. })
        ));

        let mut extra = bc.snapshot();
        extra
            .pending_transactions
            .push(Transaction::coinbase(Address::new("thief"), 20));
        match Ledger::restore(extra, LedgerConfig::default()).unwrap_err() {
            LedgerError::CorruptPending { position, source } => {
                assert_eq!(position, 2);
                assert!(matches!(
                    *source,
                    LedgerError::Validation(ValidationError::UnexpectedReward)
                ));
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut doubled = bc.snapshot();
        let dup = doubled.pending_transactions[1].clone();
        doubled.pending_transactions.push(dup);
        assert!(matches!(
            Ledger::restore(doubled, LedgerConfig::default()),
            Err(LedgerError::CorruptPending { position: 2, .. })
        ));
    }

    #[test]
    fn restored_pool_can_still_be_mined() {
        let sk = key(1);
        let (mut bc, _) = funded(&sk);
        bc.submit_transaction(transfer(&bc, &sk, &Address::new("bob"), 5))
            .unwrap();
        let mut restored = Ledger::restore(bc.snapshot(), LedgerConfig::default()).unwrap();
        assert_eq!(restored.pending_transactions(), bc.pending_transactions());
        restored.mine(&Address::new("miner")).unwrap();
        assert_eq!(restored.balance_of(&Address::new("bob")), 5);
        assert!(restored.is_valid());
    }

    #[test]
    fn construction_rejects_invalid_config() {
        for config in [
            LedgerConfig {
                difficulty: 65,
                ..LedgerConfig::default()
            },
            LedgerConfig {
                mining_reward: 0,
                ..LedgerConfig::default()
            },
            LedgerConfig {
                mining_workers: 0,
                ..LedgerConfig::default()
            },
        ] {
            assert!(matches!(Ledger::new(config), Err(LedgerError::Config(_))));
        }
        assert!(Ledger::with_engine(LedgerConfig::default(), SignatureEngine::new()).is_ok());
    }
}
