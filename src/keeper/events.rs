//! Decoded protocol events consumed by the state replicator.
//!
//! Wire decoding lives in the log-source collaborator; by the time a
//! record reaches the replicator it carries typed fields. Manager-level
//! events are scoped to the manager contract, everything else to the
//! emitting pool (`EventRecord::address`).

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A decoded protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolEvent {
    // === Manager-level (last-write-wins, no pool scoping) ===
    UpdateReservePool {
        new_reserve_pool: Address,
    },
    UpdateLiquidationExpenseRatio {
        new_ratio: U256,
    },
    UpdateRedeemFeeRatio {
        new_ratio: U256,
    },
    UpdateTokenRate {
        token: Address,
        scalar: U256,
        provider: Address,
    },

    // === Pool-scoped field overwrites ===
    UpdatePriceOracle {
        new_oracle: Address,
    },
    UpdateRedeemStatus {
        status: bool,
    },
    UpdateMaxRedeemRatioPerTick {
        ratio: U256,
    },
    UpdateRebalanceRatios {
        debt_ratio: U256,
        bonus_ratio: U256,
    },
    UpdateLiquidateRatios {
        debt_ratio: U256,
        bonus_ratio: U256,
    },

    // === Pool-scoped accounting mutations ===
    /// Authoritative snapshot of one position: new tick assignment and
    /// share balances. Appends when `position` equals the arena length,
    /// overwrites in place otherwise.
    PositionSnapshot {
        position: u32,
        tick: i32,
        coll_shares: U256,
        debt_shares: U256,
    },
    /// A protocol redeem/move emptied `old_tick` into `new_tick`;
    /// `coll_shares`/`debt_shares` are the destination bucket's absolute
    /// post-move aggregates.
    TickMovement {
        old_tick: i32,
        new_tick: i32,
        coll_shares: U256,
        debt_shares: U256,
    },
    /// Accrued-interest snapshot: rescales every implied raw debt amount
    /// without touching shares.
    DebtIndexSnapshot {
        index: U256,
    },
    /// Exchange-rate snapshot for the collateral side.
    CollateralIndexSnapshot {
        index: U256,
    },
}

impl PoolEvent {
    /// Whether this event mutates the manager singleton rather than a pool.
    pub fn is_manager_scoped(&self) -> bool {
        matches!(
            self,
            PoolEvent::UpdateReservePool { .. }
                | PoolEvent::UpdateLiquidationExpenseRatio { .. }
                | PoolEvent::UpdateRedeemFeeRatio { .. }
                | PoolEvent::UpdateTokenRate { .. }
        )
    }
}

/// One ordered record from the log-query collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Emitting contract (manager or pool).
    pub address: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    pub event: PoolEvent,
}
