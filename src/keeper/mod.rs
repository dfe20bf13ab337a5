//! Keeper core: state replication, candidate selection, batch planning
//! and the cycle loop wiring them together.

pub mod checkpoint;
pub mod config;
pub mod encoding;
pub mod events;
pub mod ledger;
pub mod locks;
pub mod planner;
pub mod providers;
pub mod readings;
pub mod replicator;
pub mod selector;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::errors::{CycleError, KeeperError, SyncError};
use crate::keeper::checkpoint::CheckpointStore;
use crate::keeper::config::KeeperConfig;
use crate::keeper::ledger::Ledger;
use crate::keeper::locks::LockTable;
use crate::keeper::planner::{plan_pool, ActionKind, PlanInputs};
use crate::keeper::providers::{AggregateReader, LogSource, StableQuoter, Submitter};
use crate::keeper::readings::{build_read_calls, decode_readings};
use crate::keeper::replicator::StateReplicator;
use crate::keeper::selector::{liquidation_candidates, rebalance_candidates};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Open the replicator from the checkpoint if one exists, otherwise from
/// the configured genesis roster. Pools added to the config after the
/// checkpoint was taken are registered on load.
pub fn open_replicator(config: &KeeperConfig) -> Result<StateReplicator, KeeperError> {
    let store = CheckpointStore::new(&config.store_dir);
    let ledger = match store.load()? {
        Some(mut ledger) => {
            for pool in &config.pools {
                ledger.register_pool(pool.address, pool.collateral_token);
            }
            ledger
        }
        None => {
            info!(genesis_block = config.genesis_block, "No checkpoint, starting from genesis");
            config.bootstrap_ledger()
        }
    };
    Ok(StateReplicator::new(ledger, store, config.chunk_size, config.reorg_lag))
}

/// The long-running keeper: syncs the ledger, then selects, plans, and
/// submits capital actions whenever it is fully caught up.
pub struct Keeper {
    config: KeeperConfig,
    replicator: StateReplicator,
    locks: LockTable,
    source: Box<dyn LogSource>,
    reader: Box<dyn AggregateReader>,
    quoter: Box<dyn StableQuoter>,
    submitter: Box<dyn Submitter>,
}

impl Keeper {
    pub fn new(
        config: KeeperConfig,
        replicator: StateReplicator,
        source: Box<dyn LogSource>,
        reader: Box<dyn AggregateReader>,
        quoter: Box<dyn StableQuoter>,
        submitter: Box<dyn Submitter>,
    ) -> Self {
        Self {
            config,
            replicator,
            locks: LockTable::new(),
            source,
            reader,
            quoter,
            submitter,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        self.replicator.ledger()
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// One sync pass against the log source's current head.
    pub async fn sync_once(&mut self) -> Result<u64, SyncError> {
        self.replicator
            .sync(self.source.as_ref(), &mut self.locks)
            .await
    }

    /// Run forever: sync, act when caught up, back off on failure.
    pub async fn run(&mut self) -> Result<(), KeeperError> {
        info!(
            pools = self.config.pools.len(),
            dry_run = self.config.dry_run,
            use_private_relay = self.config.use_private_relay,
            "Keeper starting"
        );
        loop {
            let head = match self.sync_once().await {
                Ok(head) => head,
                Err(e) => {
                    warn!(error = %e, "Sync failed, backing off");
                    tokio::time::sleep(Duration::from_secs(self.config.sync_retry_secs)).await;
                    continue;
                }
            };
            if self.replicator.last_sync_at() == head {
                if let Err(e) = self.run_cycle().await {
                    warn!(error = %e, "Cycle failed, backing off");
                    tokio::time::sleep(Duration::from_secs(self.config.cycle_retry_secs)).await;
                    continue;
                }
            }
            tokio::time::sleep(Duration::from_secs(self.config.idle_interval_secs)).await;
        }
    }

    /// One read-select-plan-submit pass over the synced ledger.
    ///
    /// Returns the number of planned batches. In dry-run mode plans are
    /// logged instead of submitted; locks engage either way.
    pub async fn run_cycle(&mut self) -> Result<usize, CycleError> {
        let ledger = self.replicator.ledger();
        let calls = build_read_calls(ledger, &self.config.collaborators);
        let values = self.reader.read(&calls).await?;
        let readings = decode_readings(ledger, &values)?;
        let now = unix_now();

        let mut plans = Vec::new();
        let selections = [
            (
                ActionKind::Rebalance,
                rebalance_candidates(ledger, &self.locks, &readings.prices, now),
            ),
            (
                ActionKind::Liquidate,
                liquidation_candidates(ledger, &self.locks, &readings.prices, now),
            ),
        ];
        for (kind, by_pool) in selections {
            for (pool, candidates) in by_pool {
                let inputs = PlanInputs {
                    pool,
                    kind,
                    max_liquidity: readings.max_liquidity,
                    liquidation_expense_ratio: ledger.manager.liquidation_expense_ratio,
                    swap: &readings.swap,
                };
                if let Some(plan) = plan_pool(&inputs, &candidates, self.quoter.as_ref())? {
                    plans.push(plan);
                }
            }
        }

        let submitted = plans.len();
        for plan in plans {
            if self.config.dry_run {
                info!(
                    pool = %plan.pool,
                    kind = plan.kind.as_str(),
                    entries = plan.locks.len(),
                    packed_ids = %plan.packed_ids,
                    total_repay = %plan.total_repay,
                    total_bonus = %plan.total_bonus,
                    min_output = %plan.min_output,
                    use_stable = plan.use_stable,
                    "Dry-run submission"
                );
            } else {
                self.submitter
                    .submit(&plan, self.config.use_private_relay)
                    .await?;
                info!(
                    pool = %plan.pool,
                    kind = plan.kind.as_str(),
                    entries = plan.locks.len(),
                    total_repay = %plan.total_repay,
                    "Batch submitted"
                );
            }
            for key in &plan.locks {
                self.locks.lock(*key, now, self.config.lock_ttl_secs);
            }
        }
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use alloy::primitives::{Address, B256, U256};
    use async_trait::async_trait;

    use crate::keeper::config::{Collaborators, PoolBootstrap};
    use crate::keeper::events::{EventRecord, PoolEvent};
    use crate::keeper::planner::Plan;
    use crate::keeper::providers::{ParityQuoter, ReplayLogSource};
    use crate::keeper::readings::ReadCall;
    use crate::math::{FEE_PRECISION, PRECISION};

    static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn pool_addr() -> Address {
        Address::repeat_byte(0x33)
    }

    fn manager_addr() -> Address {
        Address::repeat_byte(0x44)
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * PRECISION
    }

    fn make_config() -> KeeperConfig {
        let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut config = KeeperConfig::sample();
        config.manager = manager_addr();
        config.pools = vec![PoolBootstrap {
            address: pool_addr(),
            collateral_token: Address::repeat_byte(0x55),
        }];
        config.collaborators = Collaborators {
            base_pool: Address::repeat_byte(0x61),
            stable_swap: Address::repeat_byte(0x62),
        };
        config.genesis_block = 100;
        config.reorg_lag = 0;
        config.store_dir =
            std::env::temp_dir().join(format!("pool-keeper-core-{}-{n}", std::process::id()));
        config
    }

    fn record(block: u64, address: Address, event: PoolEvent) -> EventRecord {
        EventRecord {
            address,
            block_number: block,
            tx_hash: B256::repeat_byte(0xaa),
            event,
        }
    }

    fn history() -> Vec<EventRecord> {
        vec![
            record(
                101,
                pool_addr(),
                PoolEvent::UpdateRebalanceRatios {
                    debt_ratio: ether(8) / U256::from(10u8),
                    bonus_ratio: FEE_PRECISION / U256::from(20u8),
                },
            ),
            record(
                101,
                pool_addr(),
                PoolEvent::UpdateLiquidateRatios {
                    debt_ratio: ether(9) / U256::from(10u8),
                    bonus_ratio: FEE_PRECISION / U256::from(10u8),
                },
            ),
            record(
                102,
                pool_addr(),
                PoolEvent::PositionSnapshot {
                    position: 1,
                    tick: -100,
                    coll_shares: ether(150),
                    debt_shares: ether(140),
                },
            ),
        ]
    }

    /// Answers every aggregated read with a fixed value per slot kind.
    struct StaticReader;

    #[async_trait]
    impl AggregateReader for StaticReader {
        async fn read(&self, calls: &[ReadCall]) -> Result<Vec<U256>, CycleError> {
            Ok(calls
                .iter()
                .map(|call| match call {
                    ReadCall::OraclePrice { .. } => ether(1),
                    ReadCall::BaseYieldTotal { .. } => ether(1_000_000),
                    ReadCall::BaseStableTotal { .. } => U256::ZERO,
                    ReadCall::BaseStablePrice { .. } => ether(1),
                    _ => U256::ZERO,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        submissions: Arc<Mutex<Vec<(Plan, bool)>>>,
    }

    #[async_trait]
    impl Submitter for RecordingSubmitter {
        async fn submit(&self, plan: &Plan, use_private_relay: bool) -> Result<(), CycleError> {
            self.submissions
                .lock()
                .unwrap()
                .push((plan.clone(), use_private_relay));
            Ok(())
        }
    }

    fn make_keeper(config: KeeperConfig) -> (Keeper, Arc<Mutex<Vec<(Plan, bool)>>>) {
        let replicator = open_replicator(&config).unwrap();
        let submitter = RecordingSubmitter::default();
        let submissions = Arc::clone(&submitter.submissions);
        let keeper = Keeper::new(
            config,
            replicator,
            Box::new(ReplayLogSource::from_records(history())),
            Box::new(StaticReader),
            Box::new(ParityQuoter),
            Box::new(submitter),
        );
        (keeper, submissions)
    }

    #[tokio::test]
    async fn test_full_cycle_plans_and_locks() {
        let mut config = make_config();
        config.dry_run = false;
        config.use_private_relay = true;
        let (mut keeper, submissions) = make_keeper(config);
        assert_eq!(keeper.sync_once().await.unwrap(), 102);

        // One underwater position: ratio 140/150 crosses the liquidate
        // threshold at unit price.
        let submitted = keeper.run_cycle().await.unwrap();
        assert_eq!(submitted, 1);
        assert_eq!(keeper.locks().len(), 1);

        // The submitter received the plan with the configured relay flag.
        {
            let recorded = submissions.lock().unwrap();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].0.pool, pool_addr());
            assert!(recorded[0].1);
        }

        // The locked position is not re-planned next cycle.
        assert_eq!(keeper.run_cycle().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_locks_without_submitting() {
        let config = make_config();
        assert!(config.dry_run);
        let (mut keeper, submissions) = make_keeper(config);
        keeper.sync_once().await.unwrap();

        // The plan is counted and locked, but nothing reaches the
        // submitter seam.
        assert_eq!(keeper.run_cycle().await.unwrap(), 1);
        assert_eq!(keeper.locks().len(), 1);
        assert!(submissions.lock().unwrap().is_empty());
        assert_eq!(keeper.run_cycle().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_checkpoint() {
        let config = make_config();
        let (mut keeper, _) = make_keeper(config.clone());
        keeper.sync_once().await.unwrap();
        drop(keeper);

        let replicator = open_replicator(&config).unwrap();
        assert_eq!(replicator.last_sync_at(), 102);
        assert_eq!(
            replicator.ledger().pools[&pool_addr()].positions.len(),
            2
        );
    }
}
