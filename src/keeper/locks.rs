//! Advisory soft locks over ticks and positions.
//!
//! A lock marks an entity with an action already in flight so successive
//! cycles do not re-select it before the chain confirms the outcome.
//! Locks are purely in-memory: a restart starts empty, which is safe
//! because the replicator's checkpoint is authoritative.
//!
//! Cleared two ways: passive expiry (checked lazily with the caller's
//! clock) and active clearing when the replicator applies an event that
//! supersedes the entity's state.

use std::collections::HashMap;

use alloy::primitives::Address;

/// Kind of lockable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tick,
    Position,
}

/// Identity of a lockable entity: signed tick id or position id, scoped
/// to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub pool: Address,
    pub kind: EntityKind,
    pub id: i64,
}

impl LockKey {
    pub fn tick(pool: Address, tick: i32) -> Self {
        Self {
            pool,
            kind: EntityKind::Tick,
            id: tick as i64,
        }
    }

    pub fn position(pool: Address, position: u32) -> Self {
        Self {
            pool,
            kind: EntityKind::Position,
            id: position as i64,
        }
    }
}

/// Per-pool, per-entity advisory lock table with unix-time expiry.
#[derive(Debug, Default)]
pub struct LockTable {
    entries: HashMap<LockKey, u64>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key` until `now + ttl_seconds`.
    pub fn lock(&mut self, key: LockKey, now: u64, ttl_seconds: u64) {
        self.entries.insert(key, now + ttl_seconds);
    }

    /// Whether `key` is locked at `now`. Absence means unlocked.
    pub fn is_locked(&self, key: LockKey, now: u64) -> bool {
        self.entries.get(&key).is_some_and(|unlock| *unlock > now)
    }

    /// Actively clear a lock (authoritative event observed for `key`).
    pub fn clear(&mut self, key: LockKey) {
        self.entries.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
