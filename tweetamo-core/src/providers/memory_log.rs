use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{rng, Rng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::LogError;
use crate::log::{
    shard_id, shard_index_for_key, LogRecord, PartitionedLog, PublishReceipt, PullBatch,
    ShardDescription, ShardIterator, StreamDescription,
};
use crate::readiness::ResourceStatus;

#[derive(Debug)]
struct ShardLog {
    shard_id: String,
    records: Vec<LogRecord>,
}

impl ShardLog {
    fn next_sequence(&self) -> u64 {
        self.records.len() as u64
    }
}

#[derive(Debug)]
struct StreamState {
    created: Instant,
    incarnation: u64,
    shards: Vec<ShardLog>,
}

/// MemoryLog is an in-process partitioned log implementing [`PartitionedLog`].
///
/// Records are never trimmed, so sequence numbers equal their index in the shard.
/// Every instance starts empty with fresh stream incarnations.
/// Used for tests and single-process runs; supports an activation delay and
/// failure injection to exercise the readiness and retry paths.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    streams: Arc<DashMap<String, StreamState>>,
    activation_delay: Duration,
    injected_failures: Arc<AtomicUsize>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog {
            streams: Arc::new(DashMap::new()),
            activation_delay: Duration::ZERO,
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Newly created streams report `Creating` until `delay` has passed.
    pub fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }

    /// Make the next `n` publish/pull calls fail with [`LogError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.injected_failures.store(n, Ordering::SeqCst);
    }

    /// Total records currently held by a stream, across shards.
    pub fn record_count(&self, stream: &str) -> usize {
        self.streams
            .get(stream)
            .map(|s| s.shards.iter().map(|sh| sh.records.len()).sum())
            .unwrap_or(0)
    }

    fn take_injected_failure(&self) -> Result<(), LogError> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(LogError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn status_of(&self, state: &StreamState) -> ResourceStatus {
        if state.created.elapsed() < self.activation_delay {
            ResourceStatus::Creating
        } else {
            ResourceStatus::Active
        }
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionedLog for MemoryLog {
    async fn describe(&self, stream: &str) -> Result<StreamDescription, LogError> {
        let state = self
            .streams
            .get(stream)
            .ok_or_else(|| LogError::StreamNotFound(stream.to_string()))?;

        Ok(StreamDescription {
            stream_name: stream.to_string(),
            incarnation: state.incarnation,
            status: self.status_of(&state),
            shards: state
                .shards
                .iter()
                .map(|s| ShardDescription {
                    shard_id: s.shard_id.clone(),
                })
                .collect(),
        })
    }

    async fn create(&self, stream: &str, shard_count: u32) -> Result<(), LogError> {
        if shard_count == 0 {
            return Err(LogError::InvalidArguments(
                "shard count must be at least 1".to_string(),
            ));
        }
        let entry = match self.streams.entry(stream.to_string()) {
            Entry::Occupied(_) => return Err(LogError::StreamExists(stream.to_string())),
            Entry::Vacant(entry) => entry,
        };
        let shards = (0..shard_count as usize)
            .map(|i| ShardLog {
                shard_id: shard_id(i),
                records: Vec::new(),
            })
            .collect();
        entry.insert(StreamState {
            created: Instant::now(),
            incarnation: rng().random(),
            shards,
        });
        Ok(())
    }

    async fn publish(
        &self,
        stream: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<PublishReceipt, LogError> {
        if partition_key.is_empty() {
            return Err(LogError::InvalidArguments(
                "partition key must not be empty".to_string(),
            ));
        }
        self.take_injected_failure()?;

        let mut state = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| LogError::StreamNotFound(stream.to_string()))?;
        if self.status_of(&state) != ResourceStatus::Active {
            return Err(LogError::NotActive(stream.to_string()));
        }

        let idx = shard_index_for_key(partition_key, state.shards.len());
        let shard = &mut state.shards[idx];
        let sequence = shard.next_sequence();
        shard.records.push(LogRecord {
            sequence,
            partition_key: partition_key.to_string(),
            payload,
            arrival_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        });

        Ok(PublishReceipt {
            shard_id: shard.shard_id.clone(),
            sequence,
        })
    }

    async fn pull(
        &self,
        stream: &str,
        shard_id: &str,
        iterator: ShardIterator,
        max_records: usize,
    ) -> Result<PullBatch, LogError> {
        self.take_injected_failure()?;

        let state = self
            .streams
            .get(stream)
            .ok_or_else(|| LogError::StreamNotFound(stream.to_string()))?;
        if self.status_of(&state) != ResourceStatus::Active {
            return Err(LogError::NotActive(stream.to_string()));
        }
        let shard = state
            .shards
            .iter()
            .find(|s| s.shard_id == shard_id)
            .ok_or_else(|| LogError::ShardNotFound(shard_id.to_string()))?;

        let start = match iterator {
            ShardIterator::TrimHorizon => 0,
            ShardIterator::Latest => shard.next_sequence(),
            ShardIterator::AfterSequence(s) => s.saturating_add(1),
            ShardIterator::AtSequence(s) => s,
        };
        let start_idx = (start as usize).min(shard.records.len());
        let end_idx = start_idx
            .saturating_add(max_records.max(1))
            .min(shard.records.len());
        let records: Vec<LogRecord> = shard.records[start_idx..end_idx].to_vec();

        let next = match records.last() {
            Some(last) => ShardIterator::AtSequence(last.sequence + 1),
            None => ShardIterator::AtSequence(start),
        };

        Ok(PullBatch { records, next })
    }
}
