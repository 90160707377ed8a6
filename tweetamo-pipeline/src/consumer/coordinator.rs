use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tweetamo_core::{wait_until_ready, PartitionedLog};

use super::{CheckpointStore, ConsumerConfig, RecordProcessor, ShardState, ShardWorker, WorkerReport};
use crate::errors::{PipelineError, Result};

/// Read-only view of the live state of every shard worker.
#[derive(Debug, Clone, Default)]
pub struct ShardStates {
    inner: Arc<DashMap<String, watch::Receiver<ShardState>>>,
}

impl ShardStates {
    /// Current state of one shard, if a worker was started for it.
    pub fn get(&self, shard_id: &str) -> Option<ShardState> {
        self.inner.get(shard_id).map(|rx| rx.borrow().clone())
    }

    /// Watch a shard's state transitions.
    pub fn subscribe(&self, shard_id: &str) -> Option<watch::Receiver<ShardState>> {
        self.inner.get(shard_id).map(|rx| rx.clone())
    }

    /// All shards and their current state, ordered by shard id.
    pub fn snapshot(&self) -> Vec<(String, ShardState)> {
        let mut all: Vec<_> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().borrow().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// LogConsumer runs one [`ShardWorker`] per shard of the stream and waits for all of them.
///
/// When one worker fails, the others are cancelled so they checkpoint and release their
/// leases before the consumer returns.
pub struct LogConsumer<L, P, C> {
    log: Arc<L>,
    processor: Arc<P>,
    checkpoints: Arc<C>,
    config: ConsumerConfig,
    states: ShardStates,
}

impl<L, P, C> LogConsumer<L, P, C>
where
    L: PartitionedLog,
    P: RecordProcessor,
    C: CheckpointStore,
{
    pub fn new(log: Arc<L>, processor: Arc<P>, checkpoints: Arc<C>, config: ConsumerConfig) -> Self {
        LogConsumer {
            log,
            processor,
            checkpoints,
            config,
            states: ShardStates::default(),
        }
    }

    pub fn states(&self) -> ShardStates {
        self.states.clone()
    }

    /// Wait for the stream, then process every shard until `cancel` fires or a worker fails.
    ///
    /// Returns one report per shard, ordered by shard id.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Vec<WorkerReport>> {
        let stream = self.config.stream_name.as_str();
        wait_until_ready(stream, self.config.readiness, &cancel, || {
            self.log.stream_status(stream)
        })
        .await?;

        let description = self.log.describe(stream).await?;
        if description.shards.is_empty() {
            return Err(PipelineError::NoShards(stream.to_string()));
        }

        let stop = cancel.child_token();
        let mut workers = JoinSet::new();
        for shard in &description.shards {
            let (worker, state_rx) = ShardWorker::new(
                shard.shard_id.clone(),
                self.config.clone(),
                Arc::clone(&self.log),
                Arc::clone(&self.processor),
                Arc::clone(&self.checkpoints),
            );
            self.states.inner.insert(shard.shard_id.clone(), state_rx);
            workers.spawn(worker.run(stop.clone()));
        }
        info!(
            target = "consumer",
            stream = %stream,
            shards = description.shards.len(),
            worker_id = %self.config.worker_id,
            "shard workers started"
        );

        let mut reports = Vec::with_capacity(description.shards.len());
        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    if report.is_failed() && !stop.is_cancelled() {
                        error!(
                            target = "consumer",
                            shard = %report.shard_id,
                            "shard worker failed, stopping the remaining workers"
                        );
                        stop.cancel();
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!(target = "consumer", error = %e, "shard worker task aborted");
                    stop.cancel();
                    panicked = Some(e.to_string());
                }
            }
        }
        if let Some(reason) = panicked {
            return Err(PipelineError::WorkerPanicked(reason));
        }

        reports.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        Ok(reports)
    }
}
