//! Batch planning: turn one pool's candidate list into at most one
//! submission-ready plan per action kind.
//!
//! Sizing rules, in order:
//! 1. repay per candidate from the closed-form target-ratio formula
//!    (liquidations additionally clamp to the entity's outstanding debt),
//! 2. sort descending by repay (stable, so scan order breaks ties),
//! 3. greedily fill up to the packing cap, clamping each repay to the
//!    base pool's available liquidity, stopping once the running total
//!    exceeds the per-batch ceiling,
//! 4. a batch at or below the dust floor is discarded entirely.

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::errors::CycleError;
use crate::keeper::encoding::{
    pack_positions, pack_ticks, MAX_LIQUIDATE_BATCH, MAX_REBALANCE_BATCH,
};
use crate::keeper::locks::LockKey;
use crate::keeper::providers::StableQuoter;
use crate::keeper::readings::StablePoolSnapshot;
use crate::keeper::selector::{Candidate, EntityId};
use crate::math::{mul_div, required_repay, FEE_PRECISION, PRECISION};

/// Scale between the 18-decimal debt token and the 6-decimal stable.
pub const STABLE_SCALAR: U256 = U256::from_limbs([1_000_000_000_000, 0, 0, 0]);

/// Slippage tolerance applied to `min_output`, in basis points.
pub const SLIPPAGE_BPS: u64 = 1;

const BPS_DENOMINATOR: u64 = 10_000;

/// Total repay above which a batch stops taking entries, 18 decimals.
pub fn repay_ceiling() -> U256 {
    U256::from(1_000_000u64) * PRECISION
}

/// Batches at or below this total are not worth the gas.
pub fn dust_floor() -> U256 {
    PRECISION / U256::from(100u64)
}

/// Which batch entrypoint a plan targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Rebalance,
    Liquidate,
}

impl ActionKind {
    pub fn batch_cap(&self) -> usize {
        match self {
            ActionKind::Rebalance => MAX_REBALANCE_BATCH,
            ActionKind::Liquidate => MAX_LIQUIDATE_BATCH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Rebalance => "rebalance",
            ActionKind::Liquidate => "liquidate",
        }
    }
}

/// Per-pool planning inputs that are not per-candidate.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    pub pool: Address,
    pub kind: ActionKind,
    /// Base-pool liquidity available for repays this cycle.
    pub max_liquidity: U256,
    /// Manager-level cut taken out of every executor bonus.
    pub liquidation_expense_ratio: U256,
    pub swap: &'a StablePoolSnapshot,
}

/// One submission-ready batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub pool: Address,
    pub kind: ActionKind,
    /// Fund via the 6-decimal stable when the swap cannot source the
    /// full repay in debt tokens.
    pub use_stable: bool,
    /// Packed entity word for the batch entrypoint.
    pub packed_ids: U256,
    pub total_repay: U256,
    pub total_bonus: U256,
    /// Slippage-protected stable-leg output floor, 6 decimals.
    pub min_output: U256,
    /// Entities to soft-lock once the plan is submitted.
    pub locks: Vec<LockKey>,
}

/// Executor bonus for one repay, net of the manager's expense cut.
fn net_bonus(repay: U256, bonus_ratio: U256, expense_ratio: U256) -> U256 {
    let gross = mul_div(repay, bonus_ratio, FEE_PRECISION).unwrap_or(U256::ZERO);
    let kept = FEE_PRECISION.saturating_sub(expense_ratio);
    mul_div(gross, kept, FEE_PRECISION).unwrap_or(U256::ZERO)
}

/// Build at most one plan from a pool's candidates.
///
/// Returns `Ok(None)` when nothing sizable survives the rules above.
pub fn plan_pool(
    inputs: &PlanInputs<'_>,
    candidates: &[Candidate],
    quoter: &dyn StableQuoter,
) -> Result<Option<Plan>, CycleError> {
    let mut sized: Vec<(EntityId, U256, U256)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let Some(mut repay) = required_repay(
            candidate.raw_debts,
            candidate.raw_colls,
            candidate.price,
            candidate.debt_ratio,
            candidate.bonus_ratio,
        ) else {
            continue;
        };
        if inputs.kind == ActionKind::Liquidate {
            repay = repay.min(candidate.raw_debts);
        }
        sized.push((candidate.entity, repay, candidate.bonus_ratio));
    }
    sized.sort_by(|a, b| b.1.cmp(&a.1));

    let cap = inputs.kind.batch_cap();
    let ceiling = repay_ceiling();
    let mut batch: Vec<EntityId> = Vec::with_capacity(cap);
    let mut total_repay = U256::ZERO;
    let mut total_bonus = U256::ZERO;
    for (entity, repay, bonus_ratio) in sized {
        if batch.len() == cap {
            break;
        }
        let repay = repay.min(inputs.max_liquidity);
        if repay.is_zero() {
            continue;
        }
        total_repay += repay;
        total_bonus += net_bonus(repay, bonus_ratio, inputs.liquidation_expense_ratio);
        batch.push(entity);
        if total_repay > ceiling {
            break;
        }
    }

    if total_repay <= dust_floor() {
        return Ok(None);
    }

    let packed_ids = match inputs.kind {
        ActionKind::Rebalance => {
            let ticks: Vec<i32> = batch
                .iter()
                .filter_map(|e| match e {
                    EntityId::Tick(t) => Some(*t),
                    EntityId::Position(_) => None,
                })
                .collect();
            pack_ticks(&ticks)
        }
        ActionKind::Liquidate => {
            let positions: Vec<u32> = batch
                .iter()
                .filter_map(|e| match e {
                    EntityId::Position(p) => Some(*p),
                    EntityId::Tick(_) => None,
                })
                .collect();
            pack_positions(&positions)
        }
    };

    // Fund with the stable directly when the swap cannot source the full
    // repay in debt tokens at the quoted rate.
    let stable_in = total_repay / STABLE_SCALAR;
    let quoted = quoter.get_dy(inputs.swap, 0, 1, stable_in)?;
    let use_stable = quoted < total_repay;

    let min_output = mul_div(
        total_repay / STABLE_SCALAR,
        U256::from(BPS_DENOMINATOR + SLIPPAGE_BPS),
        U256::from(BPS_DENOMINATOR),
    )
    .unwrap_or(U256::ZERO);

    let locks: Vec<LockKey> = batch.iter().map(|e| e.lock_key(inputs.pool)).collect();
    debug!(
        pool = %inputs.pool,
        kind = inputs.kind.as_str(),
        entries = batch.len(),
        total_repay = %total_repay,
        total_bonus = %total_bonus,
        use_stable = use_stable,
        "Planned batch"
    );
    Ok(Some(Plan {
        pool: inputs.pool,
        kind: inputs.kind,
        use_stable,
        packed_ids,
        total_repay,
        total_bonus,
        min_output,
        locks,
    }))
}
