mod errors;
pub use errors::{CheckpointError, PipelineError, ProcessError, Result};

pub mod pipeline_metrics;

mod publisher;
pub use publisher::{EventSink, Publisher, PublisherConfig, PublisherStats};

mod stream;
pub use stream::ensure_stream;

pub mod consumer;
pub use consumer::{
    CheckpointStore, ConsumerConfig, FileCheckpointStore, InitialPosition, LogConsumer,
    MemoryCheckpointStore, RecordProcessor, ShardCheckpoint, ShardState, ShardStates, ShardWorker,
    WorkerReport,
};

#[cfg(test)]
mod publisher_test;
