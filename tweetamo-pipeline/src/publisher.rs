use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tweetamo_core::{encode, Event, PartitionedLog, RetryPolicy};

use crate::pipeline_metrics::{PUBLISH_TOTAL, SINK_EVENTS_DROPPED_TOTAL, SINK_EVENTS_RECEIVED_TOTAL};

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub stream_name: String,
    pub queue_capacity: usize,
    // total tries per event, the first one included
    pub max_attempts: usize,
    pub backoff: RetryPolicy,
}

impl PublisherConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        PublisherConfig {
            stream_name: stream_name.into(),
            queue_capacity: 1024,
            max_attempts: 3,
            backoff: RetryPolicy::new(2, 100, 2_000),
        }
    }
}

/// Counters returned by [`Publisher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub retried: u64,
    pub dropped: u64,
}

/// The upstream side of the publish queue.
///
/// `on_event` is called from the source callback and never blocks or fails: when the
/// queue is full the event is dropped and counted.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    /// Hand one event over to the publisher. Returns false when the event was dropped.
    pub fn on_event(&self, event: Event) -> bool {
        counter!(SINK_EVENTS_RECEIVED_TOTAL.name).increment(1);
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(target = "publisher", event = %event, "publish queue full, dropping event");
                counter!(SINK_EVENTS_DROPPED_TOTAL.name, "reason" => "full").increment(1);
                false
            }
            Err(TrySendError::Closed(event)) => {
                warn!(target = "publisher", event = %event, "publisher stopped, dropping event");
                counter!(SINK_EVENTS_DROPPED_TOTAL.name, "reason" => "closed").increment(1);
                false
            }
        }
    }
}

/// Publisher drains the sink queue and appends each event to the log, keyed by author.
///
/// Delivery is at-most-once: after `max_attempts` tries, or on a non-retryable error,
/// the event is logged and dropped.
pub struct Publisher<L> {
    log: Arc<L>,
    config: PublisherConfig,
    rx: mpsc::Receiver<Event>,
    stats: PublisherStats,
}

impl<L: PartitionedLog> Publisher<L> {
    pub fn new(log: Arc<L>, config: PublisherConfig) -> (Self, EventSink) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let publisher = Publisher {
            log,
            config,
            rx,
            stats: PublisherStats::default(),
        };
        (publisher, EventSink { tx })
    }

    /// Publish queued events until `cancel` fires or every sink is dropped.
    ///
    /// The event being published when `cancel` fires is finished; events still queued
    /// are counted as dropped.
    pub async fn run(mut self, cancel: CancellationToken) -> PublisherStats {
        info!(target = "publisher", stream = %self.config.stream_name, "publisher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.publish(&event).await;
        }

        self.rx.close();
        while self.rx.try_recv().is_ok() {
            self.stats.dropped += 1;
            counter!(PUBLISH_TOTAL.name, "result" => "dropped").increment(1);
        }
        info!(
            target = "publisher",
            published = self.stats.published,
            retried = self.stats.retried,
            dropped = self.stats.dropped,
            "publisher stopped"
        );
        self.stats
    }

    async fn publish(&mut self, event: &Event) {
        let payload = encode(event);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self
                .log
                .publish(&self.config.stream_name, event.partition_key(), payload.clone())
                .await
            {
                Ok(receipt) => {
                    debug!(
                        target = "publisher",
                        event = %event,
                        shard = %receipt.shard_id,
                        sequence = receipt.sequence,
                        "event published"
                    );
                    self.stats.published += 1;
                    counter!(PUBLISH_TOTAL.name, "result" => "success").increment(1);
                    return;
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.config.backoff.calculate_backoff(attempt - 1);
                    warn!(
                        target = "publisher",
                        event = %event,
                        attempt,
                        backoff = ?backoff,
                        error = %e,
                        "publish failed, retrying"
                    );
                    self.stats.retried += 1;
                    counter!(PUBLISH_TOTAL.name, "result" => "retry").increment(1);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        target = "publisher",
                        event = %event,
                        attempts = attempt,
                        error = %e,
                        "publish failed, dropping event"
                    );
                    self.stats.dropped += 1;
                    counter!(PUBLISH_TOTAL.name, "result" => "dropped").increment(1);
                    return;
                }
            }
        }
    }
}
