//! Chunked, crash-consistent event-stream synchronization.
//!
//! The replicator owns the live ledger. Each sync pass walks the block
//! range from the cursor to the chain head in fixed-size chunks, and
//! each chunk commits all-or-nothing:
//!
//! 1. clone the ledger,
//! 2. fold every event of the chunk into the clone,
//! 3. advance the clone's cursor and persist it,
//! 4. swap the clone in and only then clear the superseded locks.
//!
//! A fetch, apply, or persist failure anywhere in the chunk leaves the
//! live ledger, the checkpoint, and the lock table exactly as they were;
//! the next pass retries the same chunk.

use tracing::{debug, info};

use crate::errors::SyncError;
use crate::keeper::checkpoint::CheckpointStore;
use crate::keeper::ledger::Ledger;
use crate::keeper::locks::{LockKey, LockTable};
use crate::keeper::providers::LogSource;

pub struct StateReplicator {
    ledger: Ledger,
    store: CheckpointStore,
    chunk_size: u64,
    reorg_lag: u64,
}

impl StateReplicator {
    pub fn new(ledger: Ledger, store: CheckpointStore, chunk_size: u64, reorg_lag: u64) -> Self {
        Self {
            ledger,
            store,
            chunk_size: chunk_size.max(1),
            reorg_lag,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn last_sync_at(&self) -> u64 {
        self.ledger.last_sync_at
    }

    /// Catch the ledger up to the source's head minus the reorg lag.
    /// Returns the sync target block.
    ///
    /// Partial progress is kept: chunks committed before a failure stay
    /// committed, and the error surfaces for the caller to back off on.
    pub async fn sync(
        &mut self,
        source: &dyn LogSource,
        locks: &mut LockTable,
    ) -> Result<u64, SyncError> {
        let head = source.chain_head().await?;
        let target = head.saturating_sub(self.reorg_lag);
        let addresses = self.ledger.tracked_addresses();
        let mut from = self.ledger.last_sync_at + 1;
        while from <= target {
            let to = target.min(from + self.chunk_size - 1);
            let events = source.fetch_events(from, to, &addresses).await?;

            let mut working = self.ledger.clone();
            let mut cleared: Vec<LockKey> = Vec::new();
            for record in &events {
                cleared.extend(working.apply(record)?);
            }
            working.last_sync_at = to;
            self.store.save(&working)?;

            self.ledger = working;
            for key in cleared {
                locks.clear(key);
            }
            debug!(from = from, to = to, events = events.len(), "Chunk committed");
            from = to + 1;
        }
        info!(head = head, cursor = self.ledger.last_sync_at, "Ledger in sync");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use alloy::primitives::{Address, B256, U256};
    use async_trait::async_trait;

    use crate::keeper::events::{EventRecord, PoolEvent};
    use crate::math::PRECISION;

    static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> CheckpointStore {
        let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        CheckpointStore::new(std::env::temp_dir().join(format!(
            "pool-keeper-replicator-{}-{n}",
            std::process::id()
        )))
    }

    fn pool_addr() -> Address {
        Address::repeat_byte(0x33)
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * PRECISION
    }

    fn make_ledger() -> Ledger {
        let mut ledger = Ledger::new(Address::repeat_byte(0x44), 100);
        ledger.register_pool(pool_addr(), Address::repeat_byte(0x55));
        ledger
    }

    fn snapshot(block: u64, position: u32, tick: i32) -> EventRecord {
        EventRecord {
            address: pool_addr(),
            block_number: block,
            tx_hash: B256::repeat_byte(0xee),
            event: PoolEvent::PositionSnapshot {
                position,
                tick,
                coll_shares: ether(150),
                debt_shares: ether(100),
            },
        }
    }

    /// Serves a fixed event set but fails fetches of any chunk whose
    /// range is listed, once each.
    struct FlakySource {
        head: u64,
        events: Vec<EventRecord>,
        fail_from: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl LogSource for FlakySource {
        async fn chain_head(&self) -> Result<u64, SyncError> {
            Ok(self.head)
        }

        async fn fetch_events(
            &self,
            from: u64,
            to: u64,
            addresses: &[Address],
        ) -> Result<Vec<EventRecord>, SyncError> {
            let mut failures = self.fail_from.lock().unwrap();
            if let Some(i) = failures.iter().position(|f| *f == from) {
                failures.remove(i);
                return Err(SyncError::Fetch {
                    from,
                    to,
                    message: "simulated outage".into(),
                });
            }
            Ok(self
                .events
                .iter()
                .filter(|r| {
                    (from..=to).contains(&r.block_number) && addresses.contains(&r.address)
                })
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_sync_walks_chunks_and_persists() {
        let store = temp_store();
        let mut replicator = StateReplicator::new(make_ledger(), store.clone(), 10, 0);
        let source = FlakySource {
            head: 130,
            events: vec![snapshot(105, 1, -100), snapshot(125, 2, -90)],
            fail_from: Mutex::new(vec![]),
        };
        let mut locks = LockTable::new();

        let head = replicator.sync(&source, &mut locks).await.unwrap();
        assert_eq!(head, 130);
        assert_eq!(replicator.last_sync_at(), 130);
        assert_eq!(replicator.ledger().pools[&pool_addr()].positions.len(), 3);

        // The checkpoint carries the committed cursor.
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_sync_at, 130);
    }

    #[tokio::test]
    async fn test_reorg_lag_holds_back_from_head() {
        let store = temp_store();
        let mut replicator = StateReplicator::new(make_ledger(), store, 10, 1);
        // An event right at the head stays unapplied until the head moves
        // past it.
        let source = FlakySource {
            head: 110,
            events: vec![snapshot(105, 1, -100), snapshot(110, 2, -90)],
            fail_from: Mutex::new(vec![]),
        };
        let mut locks = LockTable::new();

        let target = replicator.sync(&source, &mut locks).await.unwrap();
        assert_eq!(target, 109);
        assert_eq!(replicator.last_sync_at(), 109);
        assert_eq!(replicator.ledger().pools[&pool_addr()].positions.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_earlier_progress() {
        let store = temp_store();
        let mut replicator = StateReplicator::new(make_ledger(), store.clone(), 10, 0);
        // Chunks: 101..=110, 111..=120, 121..=130. The middle one fails.
        let source = FlakySource {
            head: 130,
            events: vec![snapshot(105, 1, -100), snapshot(115, 2, -90)],
            fail_from: Mutex::new(vec![111]),
        };
        let mut locks = LockTable::new();

        let err = replicator.sync(&source, &mut locks).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { from: 111, .. }));
        assert_eq!(replicator.last_sync_at(), 110);
        assert_eq!(replicator.ledger().pools[&pool_addr()].positions.len(), 2);
        assert_eq!(store.load().unwrap().unwrap().last_sync_at, 110);

        // Retry resumes from the failed chunk, not from scratch.
        replicator.sync(&source, &mut locks).await.unwrap();
        assert_eq!(replicator.last_sync_at(), 130);
        assert_eq!(replicator.ledger().pools[&pool_addr()].positions.len(), 3);
    }

    #[tokio::test]
    async fn test_bad_event_aborts_whole_chunk() {
        let store = temp_store();
        let mut replicator = StateReplicator::new(make_ledger(), store.clone(), 100, 0);
        // Valid event first, then a gapped position id in the same chunk.
        let source = FlakySource {
            head: 110,
            events: vec![snapshot(105, 1, -100), snapshot(106, 7, -90)],
            fail_from: Mutex::new(vec![]),
        };
        let mut locks = LockTable::new();
        locks.lock(LockKey::tick(pool_addr(), -100), 1_000, 60);

        let err = replicator.sync(&source, &mut locks).await.unwrap_err();
        assert!(matches!(err, SyncError::Apply(_)));
        // Nothing from the chunk landed, including the valid first event,
        // and the superseded lock is still held.
        assert_eq!(replicator.last_sync_at(), 100);
        assert_eq!(replicator.ledger().pools[&pool_addr()].positions.len(), 1);
        assert!(locks.is_locked(LockKey::tick(pool_addr(), -100), 1_000));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_chunk_clears_superseded_locks() {
        let store = temp_store();
        let mut replicator = StateReplicator::new(make_ledger(), store, 100, 0);
        let source = FlakySource {
            head: 110,
            events: vec![snapshot(105, 1, -100)],
            fail_from: Mutex::new(vec![]),
        };
        let mut locks = LockTable::new();
        locks.lock(LockKey::tick(pool_addr(), -100), 1_000, 60);
        locks.lock(LockKey::position(pool_addr(), 1), 1_000, 60);
        locks.lock(LockKey::tick(pool_addr(), -90), 1_000, 60);

        replicator.sync(&source, &mut locks).await.unwrap();
        assert!(!locks.is_locked(LockKey::tick(pool_addr(), -100), 1_000));
        assert!(!locks.is_locked(LockKey::position(pool_addr(), 1), 1_000));
        // Untouched entities keep their locks.
        assert!(locks.is_locked(LockKey::tick(pool_addr(), -90), 1_000));
    }
}
