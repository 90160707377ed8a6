use metrics::counter;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tweetamo_core::{decode, LogError, PartitionedLog, RetryPolicy, ShardIterator};

use super::{CheckpointStore, ConsumerConfig, RecordProcessor};
use crate::errors::{CheckpointError, ProcessError};
use crate::pipeline_metrics::{
    CONSUMER_CHECKPOINTS_TOTAL, CONSUMER_RECORDS_MALFORMED_TOTAL,
    CONSUMER_RECORDS_PROCESSED_TOTAL, CONSUMER_WORKER_FAILURES_TOTAL,
};

/// Lifecycle of one shard worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardState {
    Initializing,
    Processing,
    ShuttingDown,
    /// Retry budget exhausted or a fatal processor error; carries the reason.
    Failed(String),
    /// Another worker id holds the lease; this worker never started processing.
    LeaseUnavailable(String),
}

/// Summary returned by a worker when it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub shard_id: String,
    pub state: ShardState,
    pub processed: u64,
    pub malformed: u64,
    pub last_checkpoint: Option<u64>,
}

impl WorkerReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ShardState::Failed(_))
    }
}

#[derive(Debug, Default)]
struct Progress {
    processed: u64,
    malformed: u64,
    last_checkpoint: Option<u64>,
}

enum StepError {
    Cancelled,
    LeaseHeld(String),
    Failed(String),
}

enum Retry<E> {
    Cancelled,
    Exhausted { error: E, attempts: usize },
}

impl<E: Display> Retry<E> {
    fn into_step(self, what: &str) -> StepError {
        match self {
            Retry::Cancelled => StepError::Cancelled,
            Retry::Exhausted { error, attempts } => {
                StepError::Failed(format!("{} failed after {} attempt(s): {}", what, attempts, error))
            }
        }
    }
}

/// Run `op` until it succeeds, the error is not retryable, the budget is spent, or `cancel`
/// (when given) fires during a backoff.
async fn retrying<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    shard_id: &str,
    what: &'static str,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, Retry<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt < policy.max_retries() => {
                let backoff = policy.calculate_backoff(attempt);
                attempt += 1;
                warn!(
                    target = "consumer",
                    shard = %shard_id,
                    op = what,
                    attempt,
                    backoff = ?backoff,
                    error = %e,
                    "retrying after transient error"
                );
                match cancel {
                    Some(cancel) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Retry::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    },
                    None => tokio::time::sleep(backoff).await,
                }
            }
            Err(error) => {
                return Err(Retry::Exhausted {
                    error,
                    attempts: attempt + 1,
                })
            }
        }
    }
}

/// ShardWorker drives one shard: lease, resume, pull, process in order, checkpoint.
///
/// Delivery is at-least-once: a batch is checkpointed only after every record in it
/// was handed to the processor, so a crash replays at most the in-flight batch.
/// Cancellation is observed between batches: a batch already pulled is finished,
/// retries included, and checkpointed before the worker shuts down.
///
/// A checkpoint taken against another incarnation of the stream is discarded and the
/// shard starts from the configured initial position.
pub struct ShardWorker<L, P, C> {
    shard_id: String,
    config: ConsumerConfig,
    log: Arc<L>,
    processor: Arc<P>,
    checkpoints: Arc<C>,
    state: watch::Sender<ShardState>,
}

impl<L, P, C> ShardWorker<L, P, C>
where
    L: PartitionedLog,
    P: RecordProcessor,
    C: CheckpointStore,
{
    pub fn new(
        shard_id: impl Into<String>,
        config: ConsumerConfig,
        log: Arc<L>,
        processor: Arc<P>,
        checkpoints: Arc<C>,
    ) -> (Self, watch::Receiver<ShardState>) {
        let (state, state_rx) = watch::channel(ShardState::Initializing);
        let worker = ShardWorker {
            shard_id: shard_id.into(),
            config,
            log,
            processor,
            checkpoints,
            state,
        };
        (worker, state_rx)
    }

    /// Run until `cancel` fires or the shard fails. Never returns an error: the outcome is
    /// in the report's state.
    pub async fn run(self, cancel: CancellationToken) -> WorkerReport {
        let mut progress = Progress::default();
        self.state.send_replace(ShardState::Initializing);

        let result = match self.initialize(&cancel).await {
            Ok(iterator) => {
                self.state.send_replace(ShardState::Processing);
                self.process(&cancel, iterator, &mut progress).await
            }
            Err(e) => Err(e),
        };
        self.finish(result, progress).await
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<ShardIterator, StepError> {
        let owner = self.config.worker_id.as_str();
        let stream = self.config.stream_name.as_str();
        let shard = self.shard_id.as_str();
        let checkpoint = retrying(
            &self.config.retry,
            Some(cancel),
            &self.shard_id,
            "acquire lease",
            CheckpointError::is_retryable,
            || self.checkpoints.acquire_lease(&self.shard_id, owner),
        )
        .await
        .map_err(|r| match r {
            Retry::Exhausted {
                error: CheckpointError::LeaseHeld { owner, .. },
                ..
            } => StepError::LeaseHeld(owner),
            other => other.into_step("acquire lease"),
        })?;

        let incarnation = retrying(
            &self.config.retry,
            Some(cancel),
            shard,
            "describe stream",
            LogError::is_retryable,
            || self.log.describe(stream),
        )
        .await
        .map_err(|r| r.into_step("describe stream"))?
        .incarnation;

        let iterator = match (checkpoint.stream_incarnation, checkpoint.sequence) {
            (Some(bound), Some(sequence)) if bound == incarnation => {
                ShardIterator::AfterSequence(sequence)
            }
            (Some(bound), None) if bound == incarnation => self.config.initial_position.into(),
            (bound, sequence) => {
                if sequence.is_some() {
                    warn!(
                        target = "consumer",
                        shard = %shard,
                        checkpoint = ?sequence,
                        checkpoint_incarnation = ?bound,
                        incarnation,
                        "checkpoint belongs to another incarnation of the stream, discarding it"
                    );
                }
                retrying(
                    &self.config.retry,
                    Some(cancel),
                    shard,
                    "rebind checkpoint",
                    CheckpointError::is_retryable,
                    || self.checkpoints.rebind(shard, owner, incarnation),
                )
                .await
                .map_err(|r| r.into_step("rebind checkpoint"))?;
                self.config.initial_position.into()
            }
        };
        info!(
            target = "consumer",
            shard = %shard,
            owner = %owner,
            incarnation,
            checkpoint = ?checkpoint.sequence,
            iterator = %iterator,
            "shard leased, starting"
        );
        Ok(iterator)
    }

    async fn process(
        &self,
        cancel: &CancellationToken,
        mut iterator: ShardIterator,
        progress: &mut Progress,
    ) -> Result<(), StepError> {
        let stream = self.config.stream_name.as_str();
        let shard = self.shard_id.as_str();

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let batch = retrying(
                &self.config.retry,
                Some(cancel),
                shard,
                "pull",
                LogError::is_retryable,
                || self.log.pull(stream, shard, iterator, self.config.batch_size),
            )
            .await
            .map_err(|r| r.into_step("pull"))?;

            if batch.records.is_empty() {
                iterator = batch.next;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.config.idle_interval) => {}
                }
                continue;
            }

            for record in &batch.records {
                let event = match decode(&record.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(
                            target = "consumer",
                            shard = %shard,
                            sequence = record.sequence,
                            error = %e,
                            "skipping malformed record"
                        );
                        counter!(CONSUMER_RECORDS_MALFORMED_TOTAL.name, "shard" => shard.to_string())
                            .increment(1);
                        progress.malformed += 1;
                        continue;
                    }
                };

                retrying(
                    &self.config.retry,
                    None,
                    shard,
                    "process",
                    |e: &ProcessError| matches!(e, ProcessError::Transient(_)),
                    || self.processor.process(shard, &event),
                )
                .await
                .map_err(|r| r.into_step("process"))?;

                progress.processed += 1;
                counter!(CONSUMER_RECORDS_PROCESSED_TOTAL.name, "shard" => shard.to_string())
                    .increment(1);
            }

            if let Some(last) = batch.last_sequence() {
                retrying(
                    &self.config.retry,
                    None,
                    shard,
                    "checkpoint",
                    CheckpointError::is_retryable,
                    || self.checkpoints.commit(shard, &self.config.worker_id, last),
                )
                .await
                .map_err(|r| r.into_step("checkpoint"))?;

                progress.last_checkpoint = Some(last);
                counter!(CONSUMER_CHECKPOINTS_TOTAL.name, "shard" => shard.to_string()).increment(1);
                debug!(
                    target = "consumer",
                    shard = %shard,
                    sequence = last,
                    records = batch.records.len(),
                    "batch checkpointed"
                );
            }
            iterator = batch.next;
        }
    }

    async fn finish(&self, result: Result<(), StepError>, progress: Progress) -> WorkerReport {
        let state = match result {
            Ok(()) | Err(StepError::Cancelled) => {
                self.state.send_replace(ShardState::ShuttingDown);
                info!(
                    target = "consumer",
                    shard = %self.shard_id,
                    processed = progress.processed,
                    checkpoint = ?progress.last_checkpoint,
                    "shard worker shutting down"
                );
                ShardState::ShuttingDown
            }
            Err(StepError::Failed(reason)) => {
                error!(target = "consumer", shard = %self.shard_id, reason = %reason, "shard worker failed");
                counter!(CONSUMER_WORKER_FAILURES_TOTAL.name).increment(1);
                ShardState::Failed(reason)
            }
            Err(StepError::LeaseHeld(owner)) => {
                info!(
                    target = "consumer",
                    shard = %self.shard_id,
                    owner = %owner,
                    "shard lease held by another worker, skipping"
                );
                let state = ShardState::LeaseUnavailable(owner);
                self.state.send_replace(state.clone());
                return self.report(state, progress);
            }
        };

        if let Err(e) = self
            .checkpoints
            .release_lease(&self.shard_id, &self.config.worker_id)
            .await
        {
            warn!(target = "consumer", shard = %self.shard_id, error = %e, "lease release failed");
        }
        self.state.send_replace(state.clone());
        self.report(state, progress)
    }

    fn report(&self, state: ShardState, progress: Progress) -> WorkerReport {
        WorkerReport {
            shard_id: self.shard_id.clone(),
            state,
            processed: progress.processed,
            malformed: progress.malformed,
            last_checkpoint: progress.last_checkpoint,
        }
    }
}
