use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use tweetamo_core::{ReadinessOptions, RetryPolicy, ShardIterator};

mod checkpoint;
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, ShardCheckpoint};

mod processor;
pub use processor::RecordProcessor;

mod worker;
pub use worker::{ShardState, ShardWorker, WorkerReport};

mod coordinator;
pub use coordinator::{LogConsumer, ShardStates};

/// Where a shard without a checkpoint starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InitialPosition {
    #[default]
    #[serde(rename = "TRIM_HORIZON")]
    TrimHorizon,
    #[serde(rename = "LATEST")]
    Latest,
}

impl From<InitialPosition> for ShardIterator {
    fn from(position: InitialPosition) -> Self {
        match position {
            InitialPosition::TrimHorizon => ShardIterator::TrimHorizon,
            InitialPosition::Latest => ShardIterator::Latest,
        }
    }
}

impl FromStr for InitialPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRIM_HORIZON" => Ok(InitialPosition::TrimHorizon),
            "LATEST" => Ok(InitialPosition::Latest),
            other => Err(format!(
                "unknown initial position {:?}, expected TRIM_HORIZON or LATEST",
                other
            )),
        }
    }
}

impl Display for InitialPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InitialPosition::TrimHorizon => write!(f, "TRIM_HORIZON"),
            InitialPosition::Latest => write!(f, "LATEST"),
        }
    }
}

/// Settings shared by the coordinator and every shard worker.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream_name: String,
    // lease owner id written into checkpoints
    pub worker_id: String,
    pub batch_size: usize,
    // pause between pulls that returned nothing
    pub idle_interval: Duration,
    pub initial_position: InitialPosition,
    pub retry: RetryPolicy,
    pub readiness: ReadinessOptions,
}

impl ConsumerConfig {
    pub fn new(stream_name: impl Into<String>, worker_id: impl Into<String>) -> Self {
        ConsumerConfig {
            stream_name: stream_name.into(),
            worker_id: worker_id.into(),
            batch_size: 100,
            idle_interval: Duration::from_secs(1),
            initial_position: InitialPosition::TrimHorizon,
            retry: RetryPolicy::default(),
            readiness: ReadinessOptions::for_log(),
        }
    }
}
