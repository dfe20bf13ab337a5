//! Candidate selection over the replicated ledger.
//!
//! Every cycle scans the whole ledger against fresh oracle prices and
//! produces per-pool candidate lists:
//! - rebalance candidates are tick buckets whose aggregate debt ratio is
//!   at or above the rebalance threshold but below the liquidate one,
//! - liquidation candidates are individual positions at or above the
//!   liquidate threshold.
//!
//! Selection is read-only and deterministic: ticks are visited in
//! descending tick-id order, positions in ascending id order, and locked
//! entities are skipped before any ratio math runs.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::keeper::ledger::{Ledger, PoolState, SENTINEL_POSITION};
use crate::keeper::locks::{LockKey, LockTable};
use crate::math::{mul_div, ratio_at_least, BASE};

/// A tick or a position eligible for a capital action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityId {
    Tick(i32),
    Position(u32),
}

impl EntityId {
    pub fn lock_key(&self, pool: Address) -> LockKey {
        match self {
            EntityId::Tick(tick) => LockKey::tick(pool, *tick),
            EntityId::Position(id) => LockKey::position(pool, *id),
        }
    }
}

/// One eligible entity with everything the planner needs to size a repay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub entity: EntityId,
    pub raw_colls: U256,
    pub raw_debts: U256,
    pub price: U256,
    /// Target debt ratio the action must restore (rebalance or liquidate
    /// threshold of the owning pool).
    pub debt_ratio: U256,
    pub bonus_ratio: U256,
}

/// Convert index-scaled shares to raw amounts. `None` drops the entity
/// (zero index or overflow, both mean the ledger is mid-update).
fn raw_amounts(pool: &PoolState, coll_shares: U256, debt_shares: U256) -> Option<(U256, U256)> {
    let raw_colls = mul_div(coll_shares, BASE, pool.coll_index)?;
    let raw_debts = mul_div(debt_shares, pool.debt_index, BASE)?;
    Some((raw_colls, raw_debts))
}

/// Tick buckets in the rebalance band, per pool, in descending tick order.
pub fn rebalance_candidates(
    ledger: &Ledger,
    locks: &LockTable,
    prices: &BTreeMap<Address, U256>,
    now: u64,
) -> BTreeMap<Address, Vec<Candidate>> {
    let mut out = BTreeMap::new();
    for (pool_addr, pool) in &ledger.pools {
        let Some(price) = prices.get(pool_addr).copied() else {
            continue;
        };
        let mut candidates = Vec::new();
        for (tick, state) in pool.ticks.iter_desc() {
            if state.debt_shares.is_zero() {
                continue;
            }
            if locks.is_locked(LockKey::tick(*pool_addr, tick), now) {
                continue;
            }
            let Some((raw_colls, raw_debts)) = raw_amounts(pool, state.coll_shares, state.debt_shares)
            else {
                continue;
            };
            let in_band = ratio_at_least(raw_debts, raw_colls, price, pool.rebalance_debt_ratio)
                == Some(true)
                && ratio_at_least(raw_debts, raw_colls, price, pool.liquidate_debt_ratio)
                    == Some(false);
            if in_band {
                candidates.push(Candidate {
                    entity: EntityId::Tick(tick),
                    raw_colls,
                    raw_debts,
                    price,
                    debt_ratio: pool.rebalance_debt_ratio,
                    bonus_ratio: pool.rebalance_bonus_ratio,
                });
            }
        }
        if !candidates.is_empty() {
            debug!(pool = %pool_addr, count = candidates.len(), "Rebalance candidates");
            out.insert(*pool_addr, candidates);
        }
    }
    out
}

/// Positions at or above the liquidate threshold, per pool, ascending id.
pub fn liquidation_candidates(
    ledger: &Ledger,
    locks: &LockTable,
    prices: &BTreeMap<Address, U256>,
    now: u64,
) -> BTreeMap<Address, Vec<Candidate>> {
    let mut out = BTreeMap::new();
    for (pool_addr, pool) in &ledger.pools {
        let Some(price) = prices.get(pool_addr).copied() else {
            continue;
        };
        let mut candidates = Vec::new();
        for (id, position) in pool.positions.iter() {
            if id == SENTINEL_POSITION || position.debt_shares.is_zero() {
                continue;
            }
            if locks.is_locked(LockKey::position(*pool_addr, id), now) {
                continue;
            }
            let Some((raw_colls, raw_debts)) =
                raw_amounts(pool, position.coll_shares, position.debt_shares)
            else {
                continue;
            };
            if ratio_at_least(raw_debts, raw_colls, price, pool.liquidate_debt_ratio) == Some(true)
            {
                candidates.push(Candidate {
                    entity: EntityId::Position(id),
                    raw_colls,
                    raw_debts,
                    price,
                    debt_ratio: pool.liquidate_debt_ratio,
                    bonus_ratio: pool.liquidate_bonus_ratio,
                });
            }
        }
        if !candidates.is_empty() {
            debug!(pool = %pool_addr, count = candidates.len(), "Liquidation candidates");
            out.insert(*pool_addr, candidates);
        }
    }
    out
}
