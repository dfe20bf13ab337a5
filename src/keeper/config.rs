//! Keeper configuration.
//!
//! Loaded from a TOML file; every tuning knob has a default so a minimal
//! config only names the contracts. `bootstrap_ledger` turns the static
//! pool roster into a genesis ledger for first runs without a checkpoint.

use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::errors::KeeperError;
use crate::keeper::ledger::Ledger;

fn default_genesis_block() -> u64 {
    21_529_327
}

fn default_chunk_size() -> u64 {
    1_000
}

fn default_idle_interval_secs() -> u64 {
    2
}

fn default_sync_retry_secs() -> u64 {
    2
}

fn default_cycle_retry_secs() -> u64 {
    10
}

fn default_lock_ttl_secs() -> u64 {
    60
}

fn default_reorg_lag() -> u64 {
    1
}

fn default_dry_run() -> bool {
    true
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("keeper-state")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// One pool to mirror, with its static collateral binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBootstrap {
    pub address: Address,
    pub collateral_token: Address,
}

/// Non-pool contracts a cycle reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborators {
    /// Liquidity pool funding repays.
    pub base_pool: Address,
    /// Two-coin stable swap used for the funding quote.
    pub stable_swap: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Protocol manager contract (the event scope for manager-level
    /// updates).
    pub manager: Address,

    pub pools: Vec<PoolBootstrap>,

    #[serde(default)]
    pub collaborators: Collaborators,

    /// First block the protocol could have emitted events in.
    #[serde(default = "default_genesis_block")]
    pub genesis_block: u64,

    /// Checkpoint directory.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Blocks per sync chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Blocks held back from the head as reorg protection. Zero for
    /// replaying finalized history.
    #[serde(default = "default_reorg_lag")]
    pub reorg_lag: u64,

    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    #[serde(default = "default_sync_retry_secs")]
    pub sync_retry_secs: u64,

    #[serde(default = "default_cycle_retry_secs")]
    pub cycle_retry_secs: u64,

    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Log plans instead of submitting them. Locks engage either way.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Route submissions through a private relay instead of the public
    /// mempool.
    #[serde(default)]
    pub use_private_relay: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KeeperConfig {
    pub fn load(path: &Path) -> Result<Self, KeeperError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KeeperError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| KeeperError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KeeperError> {
        if self.manager.is_zero() {
            return Err(KeeperError::Config("manager address is unset".into()));
        }
        if self.pools.is_empty() {
            return Err(KeeperError::Config("no pools configured".into()));
        }
        for pool in &self.pools {
            if pool.address.is_zero() {
                return Err(KeeperError::Config("pool address is unset".into()));
            }
        }
        if self.chunk_size == 0 {
            return Err(KeeperError::Config("chunk_size must be positive".into()));
        }
        if self.logging.format != "text" && self.logging.format != "json" {
            return Err(KeeperError::Config(format!(
                "unknown log format {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// A filled-in template for `generate-config`.
    pub fn sample() -> Self {
        Self {
            manager: Address::repeat_byte(0x01),
            pools: vec![PoolBootstrap {
                address: Address::repeat_byte(0x02),
                collateral_token: Address::repeat_byte(0x03),
            }],
            collaborators: Collaborators {
                base_pool: Address::repeat_byte(0x04),
                stable_swap: Address::repeat_byte(0x05),
            },
            genesis_block: default_genesis_block(),
            store_dir: default_store_dir(),
            chunk_size: default_chunk_size(),
            reorg_lag: default_reorg_lag(),
            idle_interval_secs: default_idle_interval_secs(),
            sync_retry_secs: default_sync_retry_secs(),
            cycle_retry_secs: default_cycle_retry_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            dry_run: default_dry_run(),
            use_private_relay: false,
            logging: LoggingConfig::default(),
        }
    }

    pub fn to_toml(&self) -> Result<String, KeeperError> {
        toml::to_string_pretty(self).map_err(|e| KeeperError::Config(e.to_string()))
    }

    /// Genesis ledger for a first run without a checkpoint.
    pub fn bootstrap_ledger(&self) -> Ledger {
        let mut ledger = Ledger::new(self.manager, self.genesis_block);
        for pool in &self.pools {
            ledger.register_pool(pool.address, pool.collateral_token);
        }
        ledger
    }
}
