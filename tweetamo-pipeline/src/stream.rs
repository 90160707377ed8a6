use tokio_util::sync::CancellationToken;
use tracing::info;
use tweetamo_core::{wait_until_ready, LogError, PartitionedLog, ReadinessOptions, ResourceStatus};

use crate::errors::Result;

/// Create the stream when it does not exist yet, then wait until it is ACTIVE.
///
/// Another process creating the stream first is not an error.
pub async fn ensure_stream<L: PartitionedLog>(
    log: &L,
    stream: &str,
    shard_count: u32,
    readiness: ReadinessOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    if log.stream_status(stream).await? == ResourceStatus::NotFound {
        info!(target = "publisher", stream = %stream, shard_count, "creating stream");
        match log.create(stream, shard_count).await {
            Ok(()) | Err(LogError::StreamExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    wait_until_ready(stream, readiness, cancel, || log.stream_status(stream)).await?;
    Ok(())
}
