use async_trait::async_trait;
use tweetamo_core::Event;

use crate::errors::ProcessError;

/// Application hook invoked once per decoded record, in shard order.
///
/// Calls for one shard never overlap; calls for different shards run concurrently,
/// so implementations must be safe to share between workers.
#[async_trait]
pub trait RecordProcessor: Send + Sync + 'static {
    async fn process(&self, shard_id: &str, event: &Event) -> Result<(), ProcessError>;
}
