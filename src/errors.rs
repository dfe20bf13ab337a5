use alloy::primitives::Address;
use thiserror::Error;

/// Errors raised while folding a single event into the ledger.
///
/// Any apply error aborts the whole chunk: the cursor and the live ledger
/// are left untouched and the chunk is retried on the next sync pass.
#[derive(Error, Debug, Clone)]
pub enum ApplyError {
    #[error("event for unknown pool {0}")]
    UnknownPool(Address),

    #[error("position snapshot id {id} is ahead of arena length {len}")]
    PositionGap { id: u32, len: usize },

    #[error("tick {0} outside the addressable bucket range")]
    TickOutOfRange(i32),
}

/// Errors around the persisted checkpoint file.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint references tick {0} outside the addressable bucket range")]
    InvalidTick(i32),
}

/// Errors decoding the aggregated multi-read response.
///
/// The response is validated positionally against the request list; any
/// count mismatch means the collaborator and the ledger disagree about
/// what was asked, and the whole cycle is aborted.
#[derive(Error, Debug, Clone)]
pub enum DecodeError {
    #[error("aggregated response has {got} words, expected {expected}")]
    CountMismatch { expected: usize, got: usize },
}

/// Log-stream synchronization failures.
///
/// Recovered by retrying `sync` with an unchanged cursor after a short
/// delay; the ledger never observes a partially applied chunk.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("log fetch failed for blocks {from}..={to}: {message}")]
    Fetch {
        from: u64,
        to: u64,
        message: String,
    },

    #[error("chain head query failed: {0}")]
    Head(String),

    #[error("ledger apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("checkpoint persist failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Failures of the post-sync half of a cycle: aggregated reads, planning
/// arithmetic, quoting, submission.
///
/// Recovered by retrying the whole cycle after a longer delay. The ledger
/// and the lock table are exactly as they were before the cycle started.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("aggregated read failed: {0}")]
    Read(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("stable-swap quote failed: {0}")]
    Quote(String),

    #[error("submission failed: {0}")]
    Submit(String),
}

/// Top-level keeper error. No variant is fatal to the process; the run
/// loop logs, backs off, and retries indefinitely.
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("configuration error: {0}")]
    Config(String),
}
