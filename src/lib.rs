//! Event-sourced keeper for a tick-based lending protocol.
//!
//! The keeper mirrors on-chain pool state from the event stream into a
//! local ledger, checkpoints it crash-consistently, and each cycle scans
//! the mirror for tick buckets to rebalance and positions to liquidate,
//! packing the winners into capped batch submissions.
//!
//! Layout:
//! - [`keeper::ledger`] / [`keeper::events`]: the replicated state and
//!   its transition function,
//! - [`keeper::replicator`] / [`keeper::checkpoint`]: chunked sync and
//!   atomic persistence,
//! - [`keeper::selector`] / [`keeper::planner`] / [`keeper::encoding`]:
//!   per-cycle candidate selection, batch sizing and word packing,
//! - [`keeper::providers`]: the transport seams and replay/dry-run
//!   implementations.

#![deny(unreachable_pub)]

pub mod errors;
pub mod keeper;
pub mod math;
pub mod serde_utils;

pub use errors::{ApplyError, CheckpointError, CycleError, DecodeError, KeeperError, SyncError};
pub use keeper::config::KeeperConfig;
pub use keeper::{open_replicator, Keeper};
