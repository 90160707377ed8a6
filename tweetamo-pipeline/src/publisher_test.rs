#[cfg(test)]
mod tests {
    use crate::{Publisher, PublisherConfig, PublisherStats};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tweetamo_core::log::{shard_id, shard_index_for_key};
    use tweetamo_core::providers::MemoryLog;
    use tweetamo_core::{decode, Event, PartitionedLog, RetryPolicy, ShardIterator};

    fn config() -> PublisherConfig {
        PublisherConfig {
            stream_name: "events".to_string(),
            queue_capacity: 16,
            max_attempts: 3,
            backoff: RetryPolicy::new(2, 10, 50),
        }
    }

    async fn ready_log(shards: u32) -> Arc<MemoryLog> {
        let log = Arc::new(MemoryLog::new());
        log.create("events", shards).await.unwrap();
        log
    }

    /// Test: Events are routed by author and keep their order
    ///
    /// Flow
    /// - Feed five events from two authors through the sink, then drop the sink
    ///
    /// Expected
    /// - The publisher drains the queue and stops on its own
    /// - Each author's events sit on the author's shard in feed order
    #[tokio::test]
    async fn test_publishes_by_author_in_order() {
        let log = ready_log(4).await;
        let (publisher, sink) = Publisher::new(Arc::clone(&log), config());
        let handle = tokio::spawn(publisher.run(CancellationToken::new()));

        for (id, author) in [(1, "alice"), (2, "bob"), (3, "alice"), (4, "bob"), (5, "alice")] {
            assert!(sink.on_event(Event::new(id, id * 10, author, "t")));
        }
        drop(sink);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            PublisherStats {
                published: 5,
                retried: 0,
                dropped: 0
            }
        );

        let shard = shard_id(shard_index_for_key("alice", 4));
        let batch = log
            .pull("events", &shard, ShardIterator::TrimHorizon, 10)
            .await
            .unwrap();
        let alice: Vec<u64> = batch
            .records
            .iter()
            .map(|r| decode(&r.payload).unwrap())
            .filter(|e| e.author == "alice")
            .map(|e| e.id)
            .collect();
        assert_eq!(alice, vec![1, 3, 5]);
    }

    /// Test: Bounded retry then drop
    ///
    /// Purpose
    /// - Transient failures are retried up to `max_attempts` tries, then the event is dropped
    ///
    /// Flow
    /// - Inject 5 failures and publish two events with 3 attempts each
    ///
    /// Expected
    /// - First event: 3 failures, dropped. Second event: 2 failures, then published
    #[tokio::test(start_paused = true)]
    async fn test_retry_then_drop() {
        let log = ready_log(1).await;
        log.fail_next(5);
        let (publisher, sink) = Publisher::new(Arc::clone(&log), config());

        sink.on_event(Event::new(1, 1, "alice", "lost"));
        sink.on_event(Event::new(2, 2, "alice", "kept"));
        drop(sink);

        let stats = publisher.run(CancellationToken::new()).await;
        assert_eq!(
            stats,
            PublisherStats {
                published: 1,
                retried: 4,
                dropped: 1
            }
        );
        assert_eq!(log.record_count("events"), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_drops_immediately() {
        let log = Arc::new(MemoryLog::new());
        let (publisher, sink) = Publisher::new(log, config());
        sink.on_event(Event::new(1, 1, "alice", "no stream"));
        drop(sink);

        let stats = publisher.run(CancellationToken::new()).await;
        assert_eq!(stats.retried, 0);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let log = ready_log(1).await;
        let mut cfg = config();
        cfg.queue_capacity = 1;
        let (publisher, sink) = Publisher::new(log, cfg);

        assert!(sink.on_event(Event::new(1, 1, "alice", "a")));
        assert!(!sink.on_event(Event::new(2, 2, "alice", "b")));

        // cancelled before running: the queued event is counted as dropped
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = publisher.run(cancel).await;
        assert_eq!(stats.published, 0);
        assert_eq!(stats.dropped, 1);

        assert!(!sink.on_event(Event::new(3, 3, "alice", "c")));
    }
}
