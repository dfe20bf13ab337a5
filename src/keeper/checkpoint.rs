//! Crash-consistent ledger persistence.
//!
//! One JSON file holds the whole mirror: the sync cursor, the manager
//! singleton and every pool. Saves go through a temp file and an atomic
//! rename, so a crash mid-write leaves the previous checkpoint intact.
//! Tick rows are zero-elided; a bucket that is absent and a bucket that
//! is present with zero shares load identically. Position rows are dense
//! (sentinel included) so arena ids survive the round trip.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::CheckpointError;
use crate::keeper::ledger::{
    Ledger, ManagerConfig, PoolState, Position, PositionArena, RateProviderEntry, TickState,
};
use crate::serde_utils::Decimal;

const CHECKPOINT_FILE: &str = "state.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TickRow {
    tick: i32,
    debts: Decimal,
    colls: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PositionRow {
    tick: i32,
    debts: Decimal,
    colls: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PoolBlob {
    address: Address,
    collateral_token: Address,
    price_oracle: Address,
    coll_index: Decimal,
    debt_index: Decimal,
    redeem_status: bool,
    max_redeem_ratio_per_tick: Decimal,
    rebalance_debt_ratio: Decimal,
    rebalance_bonus_ratio: Decimal,
    liquidate_debt_ratio: Decimal,
    liquidate_bonus_ratio: Decimal,
    ticks: Vec<TickRow>,
    positions: Vec<PositionRow>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManagerBlob {
    address: Address,
    #[serde(rename = "ReservePoolAddress")]
    reserve_pool: Address,
    redeem_fee_ratio: Decimal,
    liquidation_expense_ratio: Decimal,
    /// `(token, scalar, provider)` triples.
    #[serde(rename = "RateProvider")]
    rate_providers: Vec<(Address, Decimal, Address)>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CheckpointFile {
    last_sync_at: u64,
    pool_manager: ManagerBlob,
    pools: Vec<PoolBlob>,
}

fn to_blob(ledger: &Ledger) -> CheckpointFile {
    let manager = &ledger.manager;
    let pool_manager = ManagerBlob {
        address: manager.address,
        reserve_pool: manager.reserve_pool,
        redeem_fee_ratio: manager.redeem_fee_ratio.into(),
        liquidation_expense_ratio: manager.liquidation_expense_ratio.into(),
        rate_providers: manager
            .rate_providers
            .iter()
            .map(|(token, entry)| (*token, entry.scalar.into(), entry.provider))
            .collect(),
    };
    let pools = ledger
        .pools
        .iter()
        .map(|(address, pool)| {
            let ticks = pool
                .ticks
                .iter_nonzero()
                .map(|(tick, state)| TickRow {
                    tick,
                    debts: state.debt_shares.into(),
                    colls: state.coll_shares.into(),
                })
                .collect();
            let positions = pool
                .positions
                .iter()
                .map(|(_, position)| PositionRow {
                    tick: position.tick,
                    debts: position.debt_shares.into(),
                    colls: position.coll_shares.into(),
                })
                .collect();
            PoolBlob {
                address: *address,
                collateral_token: pool.collateral_token,
                price_oracle: pool.price_oracle,
                coll_index: pool.coll_index.into(),
                debt_index: pool.debt_index.into(),
                redeem_status: pool.redeem_status,
                max_redeem_ratio_per_tick: pool.max_redeem_ratio_per_tick.into(),
                rebalance_debt_ratio: pool.rebalance_debt_ratio.into(),
                rebalance_bonus_ratio: pool.rebalance_bonus_ratio.into(),
                liquidate_debt_ratio: pool.liquidate_debt_ratio.into(),
                liquidate_bonus_ratio: pool.liquidate_bonus_ratio.into(),
                ticks,
                positions,
            }
        })
        .collect();
    CheckpointFile {
        last_sync_at: ledger.last_sync_at,
        pool_manager,
        pools,
    }
}

fn from_blob(file: CheckpointFile) -> Result<Ledger, CheckpointError> {
    let mut manager = ManagerConfig::new(file.pool_manager.address);
    manager.reserve_pool = file.pool_manager.reserve_pool;
    manager.redeem_fee_ratio = file.pool_manager.redeem_fee_ratio.into();
    manager.liquidation_expense_ratio = file.pool_manager.liquidation_expense_ratio.into();
    for (token, scalar, provider) in file.pool_manager.rate_providers {
        manager.rate_providers.insert(
            token,
            RateProviderEntry {
                scalar: scalar.into(),
                provider,
            },
        );
    }

    let mut pools = BTreeMap::new();
    for blob in file.pools {
        let address = blob.address;
        let mut pool = PoolState::new(blob.collateral_token);
        pool.price_oracle = blob.price_oracle;
        pool.coll_index = blob.coll_index.into();
        pool.debt_index = blob.debt_index.into();
        pool.redeem_status = blob.redeem_status;
        pool.max_redeem_ratio_per_tick = blob.max_redeem_ratio_per_tick.into();
        pool.rebalance_debt_ratio = blob.rebalance_debt_ratio.into();
        pool.rebalance_bonus_ratio = blob.rebalance_bonus_ratio.into();
        pool.liquidate_debt_ratio = blob.liquidate_debt_ratio.into();
        pool.liquidate_bonus_ratio = blob.liquidate_bonus_ratio.into();
        for row in blob.ticks {
            let Some(state) = pool.ticks.get_mut(row.tick) else {
                return Err(CheckpointError::InvalidTick(row.tick));
            };
            *state = TickState {
                debt_shares: row.debts.into(),
                coll_shares: row.colls.into(),
            };
        }
        pool.positions = PositionArena::from_dense(
            blob.positions
                .into_iter()
                .map(|row| Position {
                    tick: row.tick,
                    debt_shares: row.debts.into(),
                    coll_shares: row.colls.into(),
                })
                .collect(),
        );
        pools.insert(address, pool);
    }

    Ok(Ledger {
        last_sync_at: file.last_sync_at,
        manager,
        pools,
    })
}

/// Directory-scoped checkpoint reader/writer.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Persist the ledger atomically: write to a temp file, then rename
    /// over the previous checkpoint.
    pub fn save(&self, ledger: &Ledger) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)?;
        let blob = to_blob(ledger);
        let bytes = serde_json::to_vec(&blob)?;
        let tmp = self.dir.join(format!("{CHECKPOINT_FILE}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.path())?;
        debug!(
            path = %self.path().display(),
            last_sync_at = ledger.last_sync_at,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the latest checkpoint; `Ok(None)` when none exists yet.
    pub fn load(&self) -> Result<Option<Ledger>, CheckpointError> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CheckpointFile = serde_json::from_slice(&bytes)?;
        let ledger = from_blob(file)?;
        info!(
            path = %path.display(),
            last_sync_at = ledger.last_sync_at,
            pools = ledger.pools.len(),
            "Checkpoint loaded"
        );
        Ok(Some(ledger))
    }
}
