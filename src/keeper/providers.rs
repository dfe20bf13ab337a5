//! Collaborator seams and the in-repo implementations.
//!
//! The keeper core never talks to a chain directly; it goes through four
//! narrow traits so transports can be swapped without touching sync or
//! planning logic:
//! - [`LogSource`]: ordered event retrieval plus the head cursor,
//! - [`AggregateReader`]: the batched per-cycle state read,
//! - [`StableQuoter`]: swap-output quoting against a curve snapshot,
//! - [`Submitter`]: batch submission.
//!
//! Shipped implementations cover replay and transportless operation; a
//! live RPC transport implements the same traits out of tree.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::errors::{CycleError, KeeperError, SyncError};
use crate::keeper::events::EventRecord;
use crate::keeper::planner::{Plan, STABLE_SCALAR};
use crate::keeper::readings::{ReadCall, StablePoolSnapshot};

/// Ten-decimal fee unit used by the stable swap.
const FEE_DENOMINATOR: U256 = U256::from_limbs([10_000_000_000, 0, 0, 0]);

/// Ordered access to the protocol event stream.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Latest block the source has fully indexed.
    async fn chain_head(&self) -> Result<u64, SyncError>;

    /// All events emitted by `addresses` in `from..=to`, ordered by block
    /// then by intra-block emission.
    async fn fetch_events(
        &self,
        from: u64,
        to: u64,
        addresses: &[Address],
    ) -> Result<Vec<EventRecord>, SyncError>;
}

/// Single-round-trip batched reads, answered positionally.
#[async_trait]
pub trait AggregateReader: Send + Sync {
    async fn read(&self, calls: &[ReadCall]) -> Result<Vec<U256>, CycleError>;
}

/// Output quoting for the two-coin stable swap. Pure math over a
/// snapshot, so the trait is synchronous.
pub trait StableQuoter: Send + Sync {
    fn get_dy(
        &self,
        snapshot: &StablePoolSnapshot,
        in_index: usize,
        out_index: usize,
        amount_in: U256,
    ) -> Result<U256, CycleError>;
}

/// Batch submission endpoint. `use_private_relay` routes the
/// transaction through a private relay instead of the public mempool.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, plan: &Plan, use_private_relay: bool) -> Result<(), CycleError>;
}

// ============================================================
// Replay log source
// ============================================================

/// A [`LogSource`] backed by a JSONL file of [`EventRecord`]s, one per
/// line. Used for replaying captured history and in tests.
pub struct ReplayLogSource {
    records: Vec<EventRecord>,
    head: u64,
}

impl ReplayLogSource {
    pub fn from_path(path: &Path) -> Result<Self, KeeperError> {
        let file = File::open(path)
            .map_err(|e| KeeperError::Config(format!("replay log {}: {e}", path.display())))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .map_err(|e| KeeperError::Config(format!("replay log {}: {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(&line).map_err(|e| {
                KeeperError::Config(format!(
                    "replay log {} line {}: {e}",
                    path.display(),
                    lineno + 1
                ))
            })?;
            records.push(record);
        }
        Ok(Self::from_records(records))
    }

    pub fn from_records(mut records: Vec<EventRecord>) -> Self {
        records.sort_by_key(|r| r.block_number);
        let head = records.last().map(|r| r.block_number).unwrap_or(0);
        Self { records, head }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LogSource for ReplayLogSource {
    async fn chain_head(&self) -> Result<u64, SyncError> {
        Ok(self.head)
    }

    async fn fetch_events(
        &self,
        from: u64,
        to: u64,
        addresses: &[Address],
    ) -> Result<Vec<EventRecord>, SyncError> {
        Ok(self
            .records
            .iter()
            .filter(|r| (from..=to).contains(&r.block_number) && addresses.contains(&r.address))
            .cloned()
            .collect())
    }
}

// ============================================================
// Quoters
// ============================================================

/// Flat-rate quoter: scales by the decimal gap and charges the snapshot's
/// base fee, ignoring amplification. Adequate for dry runs; a full curve
/// invariant solver implements [`StableQuoter`] out of tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParityQuoter;

impl StableQuoter for ParityQuoter {
    fn get_dy(
        &self,
        snapshot: &StablePoolSnapshot,
        in_index: usize,
        out_index: usize,
        amount_in: U256,
    ) -> Result<U256, CycleError> {
        if in_index == out_index || in_index > 1 || out_index > 1 {
            return Err(CycleError::Quote(format!(
                "unsupported coin pair {in_index}->{out_index}"
            )));
        }
        // Coin 0 is the 6-decimal stable, coin 1 the 18-decimal debt token.
        let gross = if in_index == 0 {
            amount_in.saturating_mul(STABLE_SCALAR)
        } else {
            amount_in / STABLE_SCALAR
        };
        let fee = gross.saturating_mul(snapshot.base_fee) / FEE_DENOMINATOR;
        Ok(gross.saturating_sub(fee))
    }
}

// ============================================================
// Null submitter
// ============================================================

/// A [`Submitter`] for builds without a live transport. Dry runs never
/// reach it; a non-dry cycle hitting it fails loudly instead of
/// pretending the batch went out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSubmitter;

#[async_trait]
impl Submitter for NullSubmitter {
    async fn submit(&self, plan: &Plan, _use_private_relay: bool) -> Result<(), CycleError> {
        Err(CycleError::Submit(format!(
            "no submission transport configured for pool {}",
            plan.pool
        )))
    }
}
