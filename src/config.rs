use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, MAX_DIFFICULTY};
use crate::error::{LedgerError, Result};

pub const ENV_DIFFICULTY: &str = "LEDGER_DIFFICULTY";
pub const ENV_MINING_REWARD: &str = "LEDGER_MINING_REWARD";
pub const ENV_MINING_WORKERS: &str = "LEDGER_MINING_WORKERS";
pub const ENV_MINING_TIMEOUT_MS: &str = "LEDGER_MINING_TIMEOUT_MS";
pub const ENV_COUNT_PENDING_SPENDS: &str = "LEDGER_COUNT_PENDING_SPENDS";

/// Tunables fixed at ledger creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a block hash.
    pub difficulty: u32,
    pub mining_reward: u64,
    /// Threads sharing the nonce search.
    pub mining_workers: usize,
    /// Give up on a block after this long; `None` searches until found.
    pub mining_timeout: Option<Duration>,
    /// Subtract a sender's pending spends when checking a new submission.
    pub count_pending_spends: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            mining_workers: 1,
            mining_timeout: None,
            count_pending_spends: true,
        }
    }
}

impl LedgerConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source. Missing or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            difficulty: parse_or(&lookup, ENV_DIFFICULTY, defaults.difficulty),
            mining_reward: parse_or(&lookup, ENV_MINING_REWARD, defaults.mining_reward),
            mining_workers: parse_or(&lookup, ENV_MINING_WORKERS, defaults.mining_workers),
            mining_timeout: lookup(ENV_MINING_TIMEOUT_MS)
                .and_then(|v| parse_value::<u64>(ENV_MINING_TIMEOUT_MS, &v))
                .map(Duration::from_millis),
            count_pending_spends: parse_or(
                &lookup,
                ENV_COUNT_PENDING_SPENDS,
                defaults.count_pending_spends,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "difficulty {} exceeds the {MAX_DIFFICULTY} hex digits of a digest",
                self.difficulty
            )));
        }
        if self.mining_reward == 0 {
            return Err(LedgerError::Config("mining reward must be > 0".into()));
        }
        if self.mining_workers == 0 {
            return Err(LedgerError::Config("at least one mining worker is required".into()));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| parse_value(key, &v))
        .unwrap_or(default)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!("ignoring {key}={raw:?}: not a valid value");
    }
    parsed
}
