use anyhow::{anyhow, Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tweetamo_core::providers::{MemoryLog, MemoryTable};
use tweetamo_pipeline::{
    ensure_stream, CheckpointStore, FileCheckpointStore, LogConsumer, MemoryCheckpointStore,
    Publisher, PublisherStats, WorkerReport,
};
use tweetamo_store::IndexedStore;

use crate::service_configuration::ServiceConfiguration;
use crate::source::{JsonlSource, SourceStats};
use crate::store_processor::StoreProcessor;

/// Backend services the pipeline talks to.
#[derive(Debug, Clone, Default)]
pub(crate) struct Backends {
    pub(crate) log: Arc<MemoryLog>,
    pub(crate) tables: Arc<MemoryTable>,
}

/// What every stage did before the service stopped.
#[derive(Debug)]
pub(crate) struct ServiceReport {
    pub(crate) source: SourceStats,
    pub(crate) publisher: PublisherStats,
    pub(crate) workers: Vec<WorkerReport>,
}

impl ServiceReport {
    /// 1 when any shard worker failed, 0 otherwise.
    pub(crate) fn exit_code(&self) -> ExitCode {
        if self.workers.iter().any(WorkerReport::is_failed) {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

/// Provision the stream and the table, then run source, publisher and consumer until
/// `cancel` fires or a shard worker fails.
pub(crate) async fn run<R>(
    config: &ServiceConfiguration,
    backends: &Backends,
    input: R,
    input_name: &str,
    cancel: CancellationToken,
) -> Result<ServiceReport>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    info!(
        application = %config.application_name,
        stream = %config.stream_name,
        endpoint = %config.endpoint,
        table = %config.table_name,
        "starting tweetamo service"
    );

    ensure_stream(
        backends.log.as_ref(),
        &config.stream_name,
        config.shard_count,
        config.log_readiness,
        &cancel,
    )
    .await
    .context(format!("log stream {} is not available", config.stream_name))?;

    let store = Arc::new(IndexedStore::new(
        Arc::clone(&backends.tables),
        &config.table_name,
        config.store_readiness,
    ));
    store
        .ensure_schema(&cancel)
        .await
        .context(format!("table {} is not available", config.table_name))?;

    match &config.checkpoint_dir {
        Some(dir) => {
            let checkpoints = FileCheckpointStore::open(dir)
                .await
                .context(format!("Failed to open checkpoint dir {}", dir.display()))?;
            run_pipeline(config, backends, store, Arc::new(checkpoints), input, input_name, cancel)
                .await
        }
        None => {
            let checkpoints = MemoryCheckpointStore::new();
            run_pipeline(config, backends, store, Arc::new(checkpoints), input, input_name, cancel)
                .await
        }
    }
}

async fn run_pipeline<C, R>(
    config: &ServiceConfiguration,
    backends: &Backends,
    store: Arc<IndexedStore<MemoryTable>>,
    checkpoints: Arc<C>,
    input: R,
    input_name: &str,
    cancel: CancellationToken,
) -> Result<ServiceReport>
where
    C: CheckpointStore,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (publisher, sink) = Publisher::new(Arc::clone(&backends.log), config.publisher.clone());
    let publishing = tokio::spawn(publisher.run(cancel.clone()));
    let reading = tokio::spawn(JsonlSource::new(input, input_name).run(sink, cancel.clone()));

    let consumer = LogConsumer::new(
        Arc::clone(&backends.log),
        Arc::new(StoreProcessor::new(store)),
        checkpoints,
        config.consumer.clone(),
    );
    let consumed = consumer.run(cancel.clone()).await;

    // stop the upstream side whatever the consumer outcome
    cancel.cancel();
    let source = reading
        .await
        .map_err(|e| anyhow!("upstream source task failed: {}", e))?;
    let publisher = publishing
        .await
        .map_err(|e| anyhow!("publisher task failed: {}", e))?;
    let workers = consumed.context("log consumer stopped with an error")?;

    for report in workers.iter().filter(|r| r.is_failed()) {
        error!(shard = %report.shard_id, state = ?report.state, "shard worker failed");
    }
    info!(
        received = source.accepted,
        published = publisher.published,
        dropped = publisher.dropped + source.dropped,
        processed = workers.iter().map(|r| r.processed).sum::<u64>(),
        "tweetamo service stopped"
    );

    Ok(ServiceReport {
        source,
        publisher,
        workers,
    })
}
