//! Tamper-evident, append-only ledger of signed value transfers secured by
//! Proof-of-Work.

pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod transaction;

pub use blockchain::{Block, CancelToken, Ledger, Miner, SharedLedger};
pub use config::LedgerConfig;
pub use crypto::{Address, SignatureEngine};
pub use error::{LedgerError, Result};
pub use hash::Hash256;
pub use transaction::Transaction;
