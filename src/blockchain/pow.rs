use log::debug;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::hash::Hash256;

/// How many hashes a worker computes between cancellation/deadline polls.
const POLL_INTERVAL: u64 = 1024;

/// Shared flag used to abort a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: Hash256,
    pub attempts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningOutcome {
    Found(Solution),
    /// Search stopped early. Restarting at `resume_from` skips no nonce.
    Cancelled { resume_from: u64, attempts: u64 },
}

/// Hash of a prepared preimage prefix followed by `nonce`.
pub fn seal(base: &Sha256, nonce: u64) -> Hash256 {
    let mut hasher = base.clone();
    hasher.update(nonce.to_string().as_bytes());
    Hash256::finish(hasher)
}

/// Proof-of-Work search over the nonce space.
///
/// Worker `w` of `n` tries `start + w`, `start + w + n`, ... so the shards
/// never overlap. The first worker to hit the target claims the win; every
/// other worker stops on its next iteration.
#[derive(Debug, Clone)]
pub struct Miner {
    workers: usize,
    timeout: Option<Duration>,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Miner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Search for a nonce `>= start` whose sealed hash has `difficulty`
    /// leading zero hex digits.
    pub fn search(
        &self,
        base: &Sha256,
        start: u64,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> MiningOutcome {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let stride = self.workers as u64;
        let found = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let winner: Mutex<Option<(u64, Hash256)>> = Mutex::new(None);

        let resume_from = thread::scope(|scope| {
            let handles: Vec<_> = (0..stride)
                .map(|worker| {
                    let (found, attempts, winner) = (&found, &attempts, &winner);
                    scope.spawn(move || {
                        let mut nonce = start.wrapping_add(worker);
                        let mut local: u64 = 0;
                        loop {
                            if found.load(Ordering::Relaxed) {
                                break;
                            }
                            if local % POLL_INTERVAL == 0 && local > 0 {
                                let expired = deadline.is_some_and(|d| Instant::now() >= d);
                                if expired || cancel.is_cancelled() {
                                    break;
                                }
                            }
                            let hash = seal(base, nonce);
                            local += 1;
                            if hash.meets_difficulty(difficulty) {
                                if !found.swap(true, Ordering::AcqRel) {
                                    *winner.lock().unwrap_or_else(PoisonError::into_inner) =
                                        Some((nonce, hash));
                                }
                                break;
                            }
                            nonce = nonce.wrapping_add(stride);
                        }
                        attempts.fetch_add(local, Ordering::Relaxed);
                        nonce
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|h| h.join().ok())
                .min()
                .unwrap_or(start)
        });

        let attempts = attempts.into_inner();
        let winner = winner.into_inner().unwrap_or_else(PoisonError::into_inner);
        match winner {
            Some((nonce, hash)) => {
                debug!("PoW found nonce={nonce} hash={hash} attempts={attempts}");
                MiningOutcome::Found(Solution {
                    nonce,
                    hash,
                    attempts,
                })
            }
            None => {
                debug!("PoW stopped at nonce={resume_from} attempts={attempts}");
                MiningOutcome::Cancelled {
                    resume_from,
                    attempts,
                }
            }
        }
    }
}
