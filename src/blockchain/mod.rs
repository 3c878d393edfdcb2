pub mod block;
pub mod model;
pub mod pow;
pub mod shared;

pub use block::Block;
pub use model::{BlockFault, Candidate, InvalidBlock, Ledger, LedgerSnapshot};
pub use pow::{CancelToken, Miner, MiningOutcome, Solution};
pub use shared::SharedLedger;

/// Default Proof-of-Work difficulty (number of leading zero hex digits).
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// Coins paid to the miner of each block.
pub const DEFAULT_MINING_REWARD: u64 = 20;

/// A SHA-256 digest has 64 hex digits; beyond that no nonce can win.
pub const MAX_DIFFICULTY: u32 = 64;

/// Genesis timestamp: 2021-08-03 00:00:00 UTC, in milliseconds.
pub const GENESIS_TIMESTAMP: i64 = 1_627_948_800_000;
