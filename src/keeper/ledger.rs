//! The replicated protocol ledger and its event transition function.
//!
//! The ledger is an explicit value type owned exclusively by the
//! `StateReplicator`; nothing else holds a mutable reference. `apply`
//! folds one decoded event into the ledger and reports which advisory
//! locks the event authoritatively supersedes — the caller decides when
//! to actually clear them (only after the surrounding chunk commits).
//!
//! Core invariant (share conservation): for every tick, its aggregate
//! `debt_shares`/`coll_shares` equal the sums over all positions
//! currently assigned to it. `apply` preserves this for every event.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use crate::errors::ApplyError;
use crate::keeper::events::{EventRecord, PoolEvent};
use crate::keeper::locks::LockKey;
use crate::math::{pro_rata, BASE, TICK_COUNT, TICK_OFFSET};

/// Reserved position id: "no real position". Never selected, never moved.
pub const SENTINEL_POSITION: u32 = 0;

/// Tick assigned to the sentinel position; deliberately outside the
/// addressable bucket range so it never aliases a real tick.
pub const SENTINEL_TICK: i32 = -(TICK_COUNT as i32);

/// Map a signed tick id onto its bucket index, if addressable.
pub fn tick_index(tick: i32) -> Option<usize> {
    let shifted = tick.checked_add(TICK_OFFSET)?;
    if (0..TICK_COUNT as i32).contains(&shifted) {
        Some(shifted as usize)
    } else {
        None
    }
}

/// Aggregate shares of one tick bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickState {
    pub debt_shares: U256,
    pub coll_shares: U256,
}

impl TickState {
    pub fn is_zero(&self) -> bool {
        self.debt_shares.is_zero() && self.coll_shares.is_zero()
    }
}

/// One account's record: tick assignment plus index-scaled shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub tick: i32,
    pub debt_shares: U256,
    pub coll_shares: U256,
}

impl Position {
    fn sentinel() -> Self {
        Self {
            tick: SENTINEL_TICK,
            debt_shares: U256::ZERO,
            coll_shares: U256::ZERO,
        }
    }
}

/// Fixed 65536-bucket tick array addressed by offset. Buckets never
/// shrink; an "empty" tick is just zero aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickLedger {
    buckets: Vec<TickState>,
}

impl Default for TickLedger {
    fn default() -> Self {
        Self {
            buckets: vec![TickState::default(); TICK_COUNT],
        }
    }
}

impl TickLedger {
    pub fn get(&self, tick: i32) -> Option<&TickState> {
        tick_index(tick).map(|i| &self.buckets[i])
    }

    pub fn get_mut(&mut self, tick: i32) -> Option<&mut TickState> {
        tick_index(tick).map(|i| &mut self.buckets[i])
    }

    /// All buckets in descending tick-id order (the selector's fixed scan
    /// order).
    pub fn iter_desc(&self) -> impl Iterator<Item = (i32, &TickState)> {
        self.buckets
            .iter()
            .enumerate()
            .rev()
            .map(|(i, t)| (i as i32 - TICK_OFFSET, t))
    }

    /// Non-empty buckets in ascending tick-id order (persistence elides
    /// the rest).
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (i32, &TickState)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_zero())
            .map(|(i, t)| (i as i32 - TICK_OFFSET, t))
    }
}

/// Append-only arena of positions, indexed by dense integer id.
/// Id 0 is the reserved sentinel; entries are overwritten, never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionArena {
    slots: Vec<Position>,
}

impl Default for PositionArena {
    fn default() -> Self {
        Self {
            slots: vec![Position::sentinel()],
        }
    }
}

impl PositionArena {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Position> {
        self.slots.get(id as usize)
    }

    pub fn push(&mut self, position: Position) {
        self.slots.push(position);
    }

    /// All positions with their ids, sentinel included.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Position)> {
        self.slots.iter().enumerate().map(|(i, p)| (i as u32, p))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Position)> {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, p)| (i as u32, p))
    }

    /// Rebuild from a dense checkpoint vector. An empty vector still gets
    /// the sentinel so id 0 stays reserved.
    pub fn from_dense(slots: Vec<Position>) -> Self {
        if slots.is_empty() {
            Self::default()
        } else {
            Self { slots }
        }
    }
}

/// Per-token rate provider entry on the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateProviderEntry {
    pub scalar: U256,
    pub provider: Address,
}

/// Process-wide manager configuration, mutated only by manager-level
/// events with last-write-wins semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub address: Address,
    pub reserve_pool: Address,
    pub redeem_fee_ratio: U256,
    pub liquidation_expense_ratio: U256,
    pub rate_providers: BTreeMap<Address, RateProviderEntry>,
}

impl ManagerConfig {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reserve_pool: Address::ZERO,
            redeem_fee_ratio: U256::ZERO,
            liquidation_expense_ratio: U256::ZERO,
            rate_providers: BTreeMap::new(),
        }
    }
}

/// One registered pool: risk parameters, accounting indices, tick ledger
/// and position ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub collateral_token: Address,
    pub price_oracle: Address,
    /// Collateral share index, base unit 2^96.
    pub coll_index: U256,
    /// Debt share index, base unit 2^96.
    pub debt_index: U256,
    pub redeem_status: bool,
    pub max_redeem_ratio_per_tick: U256,
    pub rebalance_debt_ratio: U256,
    pub rebalance_bonus_ratio: U256,
    pub liquidate_debt_ratio: U256,
    pub liquidate_bonus_ratio: U256,
    pub ticks: TickLedger,
    pub positions: PositionArena,
}

impl PoolState {
    pub fn new(collateral_token: Address) -> Self {
        Self {
            collateral_token,
            price_oracle: Address::ZERO,
            coll_index: BASE,
            debt_index: BASE,
            redeem_status: true,
            max_redeem_ratio_per_tick: U256::ZERO,
            rebalance_debt_ratio: U256::ZERO,
            rebalance_bonus_ratio: U256::ZERO,
            liquidate_debt_ratio: U256::ZERO,
            liquidate_bonus_ratio: U256::ZERO,
            ticks: TickLedger::default(),
            positions: PositionArena::default(),
        }
    }
}

/// Locks an event authoritatively supersedes; cleared by the caller once
/// the containing chunk commits.
pub type ClearedLocks = SmallVec<[LockKey; 4]>;

/// The full replicated mirror: manager singleton, registered pools, and
/// the sync cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    /// Last fully-applied block number (the crash-recovery checkpoint).
    pub last_sync_at: u64,
    pub manager: ManagerConfig,
    pub pools: BTreeMap<Address, PoolState>,
}

impl Ledger {
    pub fn new(manager: Address, genesis_block: u64) -> Self {
        Self {
            last_sync_at: genesis_block,
            manager: ManagerConfig::new(manager),
            pools: BTreeMap::new(),
        }
    }

    pub fn register_pool(&mut self, address: Address, collateral_token: Address) {
        self.pools
            .entry(address)
            .or_insert_with(|| PoolState::new(collateral_token));
    }

    /// Addresses whose logs the replicator subscribes to.
    pub fn tracked_addresses(&self) -> Vec<Address> {
        std::iter::once(self.manager.address)
            .chain(self.pools.keys().copied())
            .collect()
    }

    /// Fold one event into the ledger.
    pub fn apply(&mut self, record: &EventRecord) -> Result<ClearedLocks, ApplyError> {
        if record.event.is_manager_scoped() {
            self.apply_manager(record);
            return Ok(SmallVec::new());
        }
        let pool_addr = record.address;
        let pool = self
            .pools
            .get_mut(&pool_addr)
            .ok_or(ApplyError::UnknownPool(pool_addr))?;
        match &record.event {
            PoolEvent::UpdatePriceOracle { new_oracle } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, new_oracle = %new_oracle, "UpdatePriceOracle");
                pool.price_oracle = *new_oracle;
                Ok(SmallVec::new())
            }
            PoolEvent::UpdateRedeemStatus { status } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, status = status, "UpdateRedeemStatus");
                pool.redeem_status = *status;
                Ok(SmallVec::new())
            }
            PoolEvent::UpdateMaxRedeemRatioPerTick { ratio } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, ratio = %ratio, "UpdateMaxRedeemRatioPerTick");
                pool.max_redeem_ratio_per_tick = *ratio;
                Ok(SmallVec::new())
            }
            PoolEvent::UpdateRebalanceRatios {
                debt_ratio,
                bonus_ratio,
            } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, debt_ratio = %debt_ratio, bonus_ratio = %bonus_ratio, "UpdateRebalanceRatios");
                pool.rebalance_debt_ratio = *debt_ratio;
                pool.rebalance_bonus_ratio = *bonus_ratio;
                Ok(SmallVec::new())
            }
            PoolEvent::UpdateLiquidateRatios {
                debt_ratio,
                bonus_ratio,
            } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, debt_ratio = %debt_ratio, bonus_ratio = %bonus_ratio, "UpdateLiquidateRatios");
                pool.liquidate_debt_ratio = *debt_ratio;
                pool.liquidate_bonus_ratio = *bonus_ratio;
                Ok(SmallVec::new())
            }
            PoolEvent::DebtIndexSnapshot { index } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, index = %index, "DebtIndexSnapshot");
                pool.debt_index = *index;
                Ok(SmallVec::new())
            }
            PoolEvent::CollateralIndexSnapshot { index } => {
                debug!(pool = %pool_addr, tx = %record.tx_hash, index = %index, "CollateralIndexSnapshot");
                pool.coll_index = *index;
                Ok(SmallVec::new())
            }
            PoolEvent::PositionSnapshot {
                position,
                tick,
                coll_shares,
                debt_shares,
            } => Self::apply_position_snapshot(
                pool,
                pool_addr,
                record,
                *position,
                *tick,
                *coll_shares,
                *debt_shares,
            ),
            PoolEvent::TickMovement {
                old_tick,
                new_tick,
                coll_shares,
                debt_shares,
            } => Self::apply_tick_movement(
                pool,
                pool_addr,
                record,
                *old_tick,
                *new_tick,
                *coll_shares,
                *debt_shares,
            ),
            // Manager variants are routed above.
            _ => unreachable!("manager-scoped event reached pool routing"),
        }
    }

    fn apply_manager(&mut self, record: &EventRecord) {
        match &record.event {
            PoolEvent::UpdateReservePool { new_reserve_pool } => {
                debug!(tx = %record.tx_hash, new_reserve_pool = %new_reserve_pool, "UpdateReservePool");
                self.manager.reserve_pool = *new_reserve_pool;
            }
            PoolEvent::UpdateLiquidationExpenseRatio { new_ratio } => {
                debug!(tx = %record.tx_hash, new_ratio = %new_ratio, "UpdateLiquidationExpenseRatio");
                self.manager.liquidation_expense_ratio = *new_ratio;
            }
            PoolEvent::UpdateRedeemFeeRatio { new_ratio } => {
                debug!(tx = %record.tx_hash, new_ratio = %new_ratio, "UpdateRedeemFeeRatio");
                self.manager.redeem_fee_ratio = *new_ratio;
            }
            PoolEvent::UpdateTokenRate {
                token,
                scalar,
                provider,
            } => {
                debug!(tx = %record.tx_hash, token = %token, scalar = %scalar, provider = %provider, "UpdateTokenRate");
                self.manager.rate_providers.insert(
                    *token,
                    RateProviderEntry {
                        scalar: *scalar,
                        provider: *provider,
                    },
                );
            }
            _ => unreachable!("pool-scoped event reached manager routing"),
        }
    }

    fn apply_position_snapshot(
        pool: &mut PoolState,
        pool_addr: Address,
        record: &EventRecord,
        position: u32,
        tick: i32,
        coll_shares: U256,
        debt_shares: U256,
    ) -> Result<ClearedLocks, ApplyError> {
        let new_index = tick_index(tick).ok_or(ApplyError::TickOutOfRange(tick))?;
        let mut cleared: ClearedLocks = smallvec![
            LockKey::tick(pool_addr, tick),
            LockKey::position(pool_addr, position),
        ];

        let slot = position as usize;
        match slot.cmp(&pool.positions.len()) {
            Ordering::Equal => {
                pool.positions.push(Position {
                    tick,
                    coll_shares,
                    debt_shares,
                });
            }
            Ordering::Less => {
                let old = pool.positions.slots[slot].clone();
                if let Some(old_index) = tick_index(old.tick) {
                    let bucket = &mut pool.ticks.buckets[old_index];
                    bucket.coll_shares = bucket.coll_shares.saturating_sub(old.coll_shares);
                    bucket.debt_shares = bucket.debt_shares.saturating_sub(old.debt_shares);
                    cleared.push(LockKey::tick(pool_addr, old.tick));
                }
                pool.positions.slots[slot] = Position {
                    tick,
                    coll_shares,
                    debt_shares,
                };
            }
            Ordering::Greater => {
                return Err(ApplyError::PositionGap {
                    id: position,
                    len: pool.positions.len(),
                });
            }
        }

        let bucket = &mut pool.ticks.buckets[new_index];
        bucket.coll_shares += coll_shares;
        bucket.debt_shares += debt_shares;

        debug!(
            pool = %pool_addr,
            tx = %record.tx_hash,
            position = position,
            tick = tick,
            coll_shares = %coll_shares,
            debt_shares = %debt_shares,
            "PositionSnapshot"
        );
        Ok(cleared)
    }

    fn apply_tick_movement(
        pool: &mut PoolState,
        pool_addr: Address,
        record: &EventRecord,
        old_tick: i32,
        new_tick: i32,
        coll_shares: U256,
        debt_shares: U256,
    ) -> Result<ClearedLocks, ApplyError> {
        let old_index = tick_index(old_tick).ok_or(ApplyError::TickOutOfRange(old_tick))?;
        let new_index = tick_index(new_tick).ok_or(ApplyError::TickOutOfRange(new_tick))?;
        let mut cleared: ClearedLocks = smallvec![
            LockKey::tick(pool_addr, old_tick),
            LockKey::tick(pool_addr, new_tick),
        ];

        // Pre-move aggregates are the pro-rata base for re-homing.
        let before = std::mem::take(&mut pool.ticks.buckets[old_index]);
        if before.is_zero() {
            // Movement from an already-emptied tick: nothing can be
            // assigned there (share conservation), so re-homing is a
            // no-op. The destination aggregate is still authoritative.
            warn!(
                pool = %pool_addr,
                tx = %record.tx_hash,
                old_tick = old_tick,
                new_tick = new_tick,
                "TickMovement from empty tick, skipping re-home"
            );
        } else {
            for (id, position) in pool.positions.iter_mut() {
                if position.tick != old_tick {
                    continue;
                }
                position.tick = new_tick;
                position.coll_shares =
                    pro_rata(position.coll_shares, coll_shares, before.coll_shares);
                position.debt_shares =
                    pro_rata(position.debt_shares, debt_shares, before.debt_shares);
                cleared.push(LockKey::position(pool_addr, id));
            }
        }

        let bucket = &mut pool.ticks.buckets[new_index];
        bucket.coll_shares += coll_shares;
        bucket.debt_shares += debt_shares;

        debug!(
            pool = %pool_addr,
            tx = %record.tx_hash,
            old_tick = old_tick,
            new_tick = new_tick,
            coll_shares = %coll_shares,
            debt_shares = %debt_shares,
            "TickMovement"
        );
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use crate::math::PRECISION;

    fn pool_addr() -> Address {
        Address::repeat_byte(0x33)
    }

    fn manager_addr() -> Address {
        Address::repeat_byte(0x44)
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * PRECISION
    }

    fn make_ledger() -> Ledger {
        let mut ledger = Ledger::new(manager_addr(), 100);
        ledger.register_pool(pool_addr(), Address::repeat_byte(0x55));
        ledger
    }

    fn record(address: Address, event: PoolEvent) -> EventRecord {
        EventRecord {
            address,
            block_number: 101,
            tx_hash: B256::repeat_byte(0xcc),
            event,
        }
    }

    fn snapshot(position: u32, tick: i32, colls: u64, debts: u64) -> EventRecord {
        record(
            pool_addr(),
            PoolEvent::PositionSnapshot {
                position,
                tick,
                coll_shares: ether(colls),
                debt_shares: ether(debts),
            },
        )
    }

    /// Share conservation: every tick aggregate equals the sum over its
    /// assigned positions, for both share kinds.
    fn assert_conserved(pool: &PoolState) {
        let mut debts: BTreeMap<i32, U256> = BTreeMap::new();
        let mut colls: BTreeMap<i32, U256> = BTreeMap::new();
        for (_, position) in pool.positions.iter() {
            if tick_index(position.tick).is_none() {
                continue;
            }
            *debts.entry(position.tick).or_default() += position.debt_shares;
            *colls.entry(position.tick).or_default() += position.coll_shares;
        }
        for (tick, state) in pool.ticks.iter_nonzero() {
            assert_eq!(
                state.debt_shares,
                debts.get(&tick).copied().unwrap_or_default(),
                "debt shares diverge at tick {tick}"
            );
            assert_eq!(
                state.coll_shares,
                colls.get(&tick).copied().unwrap_or_default(),
                "coll shares diverge at tick {tick}"
            );
        }
        for (tick, sum) in &debts {
            assert_eq!(
                pool.ticks.get(*tick).map(|t| t.debt_shares),
                Some(*sum),
                "position debt not reflected at tick {tick}"
            );
        }
    }

    #[test]
    fn test_append_then_overwrite_conserves_shares() {
        let mut ledger = make_ledger();

        ledger.apply(&snapshot(1, -100, 150, 100)).unwrap();
        ledger.apply(&snapshot(2, -100, 50, 40)).unwrap();
        assert_conserved(&ledger.pools[&pool_addr()]);

        // Move position 1 to a different tick with new balances.
        ledger.apply(&snapshot(1, -90, 80, 60)).unwrap();
        let pool = &ledger.pools[&pool_addr()];
        assert_conserved(pool);
        assert_eq!(pool.ticks.get(-100).unwrap().debt_shares, ether(40));
        assert_eq!(pool.ticks.get(-90).unwrap().coll_shares, ether(80));
        assert_eq!(pool.positions.len(), 3);
    }

    #[test]
    fn test_position_gap_rejected() {
        let mut ledger = make_ledger();
        let err = ledger.apply(&snapshot(5, -100, 1, 1)).unwrap_err();
        assert!(matches!(err, ApplyError::PositionGap { id: 5, len: 1 }));
    }

    #[test]
    fn test_tick_movement_rehomes_pro_rata() {
        let mut ledger = make_ledger();
        ledger.apply(&snapshot(1, -100, 100, 60)).unwrap();
        ledger.apply(&snapshot(2, -100, 100, 40)).unwrap();

        // Protocol empties tick -100 into -80; post-move destination
        // aggregates are half the originals.
        let cleared = ledger
            .apply(&record(
                pool_addr(),
                PoolEvent::TickMovement {
                    old_tick: -100,
                    new_tick: -80,
                    coll_shares: ether(100),
                    debt_shares: ether(50),
                },
            ))
            .unwrap();

        let pool = &ledger.pools[&pool_addr()];
        assert_conserved(pool);
        assert!(pool.ticks.get(-100).unwrap().is_zero());
        assert_eq!(pool.ticks.get(-80).unwrap().debt_shares, ether(50));
        let p1 = pool.positions.get(1).unwrap();
        assert_eq!(p1.tick, -80);
        assert_eq!(p1.coll_shares, ether(50));
        assert_eq!(p1.debt_shares, ether(30));
        let p2 = pool.positions.get(2).unwrap();
        assert_eq!(p2.debt_shares, ether(20));

        // Both ticks and both re-homed positions are cleared.
        assert!(cleared.contains(&LockKey::tick(pool_addr(), -100)));
        assert!(cleared.contains(&LockKey::tick(pool_addr(), -80)));
        assert!(cleared.contains(&LockKey::position(pool_addr(), 1)));
        assert!(cleared.contains(&LockKey::position(pool_addr(), 2)));
    }

    #[test]
    fn test_tick_movement_from_empty_tick_is_noop_rehome() {
        let mut ledger = make_ledger();
        ledger.apply(&snapshot(1, -50, 10, 10)).unwrap();

        ledger
            .apply(&record(
                pool_addr(),
                PoolEvent::TickMovement {
                    old_tick: -200,
                    new_tick: -80,
                    coll_shares: ether(7),
                    debt_shares: ether(3),
                },
            ))
            .unwrap();

        let pool = &ledger.pools[&pool_addr()];
        // No position moved; the destination aggregate still applied.
        assert_eq!(pool.positions.get(1).unwrap().tick, -50);
        assert_eq!(pool.ticks.get(-80).unwrap().debt_shares, ether(3));
    }

    #[test]
    fn test_index_snapshot_leaves_shares_untouched() {
        let mut ledger = make_ledger();
        ledger.apply(&snapshot(1, -100, 150, 100)).unwrap();

        let doubled = BASE * U256::from(2u8);
        ledger
            .apply(&record(
                pool_addr(),
                PoolEvent::DebtIndexSnapshot { index: doubled },
            ))
            .unwrap();

        let pool = &ledger.pools[&pool_addr()];
        assert_eq!(pool.debt_index, doubled);
        assert_eq!(pool.positions.get(1).unwrap().debt_shares, ether(100));
        assert_conserved(pool);
    }

    #[test]
    fn test_manager_events_are_last_write_wins() {
        let mut ledger = make_ledger();
        let token = Address::repeat_byte(0x66);

        for scalar in [1u64, 7] {
            ledger
                .apply(&record(
                    manager_addr(),
                    PoolEvent::UpdateTokenRate {
                        token,
                        scalar: U256::from(scalar),
                        provider: Address::repeat_byte(scalar as u8),
                    },
                ))
                .unwrap();
        }
        assert_eq!(
            ledger.manager.rate_providers[&token].scalar,
            U256::from(7u8)
        );

        ledger
            .apply(&record(
                manager_addr(),
                PoolEvent::UpdateLiquidationExpenseRatio {
                    new_ratio: U256::from(123u64),
                },
            ))
            .unwrap();
        assert_eq!(ledger.manager.liquidation_expense_ratio, U256::from(123u64));
    }

    #[test]
    fn test_unknown_pool_rejected() {
        let mut ledger = make_ledger();
        let stranger = Address::repeat_byte(0x99);
        let err = ledger
            .apply(&record(
                stranger,
                PoolEvent::DebtIndexSnapshot { index: BASE },
            ))
            .unwrap_err();
        assert!(matches!(err, ApplyError::UnknownPool(p) if p == stranger));
    }

    #[test]
    fn test_random_event_sequence_conserves_shares() {
        let mut ledger = make_ledger();
        // A deterministic mixed sequence: appends, overwrites, movements.
        ledger.apply(&snapshot(1, -100, 150, 100)).unwrap();
        ledger.apply(&snapshot(2, -100, 30, 20)).unwrap();
        ledger.apply(&snapshot(3, -120, 90, 70)).unwrap();
        ledger.apply(&snapshot(2, -120, 35, 25)).unwrap();
        ledger
            .apply(&record(
                pool_addr(),
                PoolEvent::TickMovement {
                    old_tick: -120,
                    new_tick: -110,
                    coll_shares: ether(100),
                    debt_shares: ether(76),
                },
            ))
            .unwrap();
        ledger.apply(&snapshot(4, -110, 5, 5)).unwrap();
        ledger.apply(&snapshot(1, -110, 10, 10)).unwrap();
        assert_conserved(&ledger.pools[&pool_addr()]);
    }
}
