use thiserror::Error;
use tweetamo_core::{LogError, ReadinessError};

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("log not ready: {0}")]
    NotReady(#[from] ReadinessError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("stream {0} has no shards")]
    NoShards(String),

    #[error("shard worker task panicked: {0}")]
    WorkerPanicked(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(String),

    #[error("checkpoint record is corrupt: {0}")]
    Corrupt(String),

    #[error("lease on shard {shard_id} is held by {owner}")]
    LeaseHeld { shard_id: String, owner: String },

    #[error("lease on shard {shard_id} is no longer held by {owner}")]
    LeaseLost { shard_id: String, owner: String },
}

impl CheckpointError {
    /// I/O hiccups are retried; lease conflicts and corruption are definitive.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::Io(_))
    }
}

/// Outcome of a failed [`RecordProcessor`](crate::RecordProcessor) call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Worth retrying with backoff, e.g. the store is temporarily unavailable.
    #[error("transient processing error: {0}")]
    Transient(String),

    /// Retrying cannot help; the shard worker moves to `Failed`.
    #[error("fatal processing error: {0}")]
    Fatal(String),
}
