use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::errors::LogError;
use crate::readiness::ResourceStatus;

/// Description of one shard of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescription {
    pub shard_id: String,
}

/// Status and shard layout of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub stream_name: String,
    /// Identifies this instance of the stream. A stream deleted and created again under the
    /// same name gets a new value, and sequence numbers do not carry over between the two.
    pub incarnation: u64,
    pub status: ResourceStatus,
    pub shards: Vec<ShardDescription>,
}

/// Where a published record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub shard_id: String,
    pub sequence: u64,
}

/// A record as returned by a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    // position of the record inside its shard, strictly increasing
    pub sequence: u64,
    pub partition_key: String,
    pub payload: Vec<u8>,
    // server-side arrival time (ms since epoch)
    pub arrival_ms: u64,
}

/// Read position within a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardIterator {
    /// Oldest record still retained.
    TrimHorizon,
    /// Only records published after the iterator is first used.
    Latest,
    /// Records strictly after the given sequence (resume from a checkpoint).
    AfterSequence(u64),
    /// Records starting at the given sequence.
    AtSequence(u64),
}

impl Display for ShardIterator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ShardIterator::TrimHorizon => write!(f, "TRIM_HORIZON"),
            ShardIterator::Latest => write!(f, "LATEST"),
            ShardIterator::AfterSequence(s) => write!(f, "AFTER_SEQUENCE_NUMBER({})", s),
            ShardIterator::AtSequence(s) => write!(f, "AT_SEQUENCE_NUMBER({})", s),
        }
    }
}

/// One pull result: the records in shard order plus the iterator to continue from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullBatch {
    pub records: Vec<LogRecord>,
    pub next: ShardIterator,
}

impl PullBatch {
    /// Sequence of the last record in the batch, the value to checkpoint.
    pub fn last_sequence(&self) -> Option<u64> {
        self.records.last().map(|r| r.sequence)
    }
}

/// A partitioned, append-only log service (Kinesis-like).
#[async_trait]
pub trait PartitionedLog: Send + Sync + 'static {
    async fn describe(&self, stream: &str) -> Result<StreamDescription, LogError>;

    async fn create(&self, stream: &str, shard_count: u32) -> Result<(), LogError>;

    /// Append `payload` to the shard owning `partition_key`.
    async fn publish(
        &self,
        stream: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PublishReceipt, LogError>;

    /// Read up to `max_records` records of one shard starting at `iterator`.
    async fn pull(
        &self,
        stream: &str,
        shard_id: &str,
        iterator: ShardIterator,
        max_records: usize,
    ) -> Result<PullBatch, LogError>;

    /// Status probe for the readiness waiter: a missing stream is a status, not an error.
    async fn stream_status(&self, stream: &str) -> Result<ResourceStatus, LogError> {
        match self.describe(stream).await {
            Ok(description) => Ok(description.status),
            Err(LogError::StreamNotFound(_)) => Ok(ResourceStatus::NotFound),
            Err(e) => Err(e),
        }
    }
}

/// Stable routing of a partition key onto one of `shard_count` shards.
pub fn shard_index_for_key(partition_key: &str, shard_count: usize) -> usize {
    if shard_count == 0 {
        return 0;
    }
    crc32fast::hash(partition_key.as_bytes()) as usize % shard_count
}

/// Canonical shard id for the shard at `index`.
pub fn shard_id(index: usize) -> String {
    format!("shardId-{:012}", index)
}
