mod common;

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tweetamo_core::providers::MemoryLog;
use tweetamo_core::{
    decode, encode, wait_until_ready, PartitionedLog, ReadinessError, ReadinessOptions,
    ShardIterator,
};

/// Test: Encoded events survive a trip through the partitioned log
///
/// Purpose
/// - Payloads published by author come back, per shard, in publish order and decode exactly
///
/// Flow
/// - Create a 3-shard stream and interleave events from two authors
/// - Pull every shard from TRIM_HORIZON and decode
///
/// Expected
/// - Each author's events are on a single shard, in id order
#[tokio::test]
async fn per_author_order_is_kept_through_the_log() {
    let log = MemoryLog::new();
    log.create("events", 3).await.unwrap();

    let alice = common::author_events("alice", 1, 1_000, 5);
    let bob = common::author_events("bob", 100, 1_000, 5);
    for (a, b) in alice.iter().zip(bob.iter()) {
        log.publish("events", &a.author, encode(a)).await.unwrap();
        log.publish("events", &b.author, encode(b)).await.unwrap();
    }

    let description = log.describe("events").await.unwrap();
    let mut seen_alice = Vec::new();
    let mut seen_bob = Vec::new();
    let mut alice_shards = 0;
    for shard in &description.shards {
        let batch = log
            .pull("events", &shard.shard_id, ShardIterator::TrimHorizon, 100)
            .await
            .unwrap();
        let events: Vec<_> = batch.records.iter().map(|r| decode(&r.payload).unwrap()).collect();
        if events.iter().any(|e| e.author == "alice") {
            alice_shards += 1;
        }
        for e in events {
            match e.author.as_str() {
                "alice" => seen_alice.push(e),
                _ => seen_bob.push(e),
            }
        }
    }

    assert_eq!(alice_shards, 1);
    assert_eq!(seen_alice, alice);
    assert_eq!(seen_bob, bob);
}

#[tokio::test(start_paused = true)]
async fn stream_becomes_ready_after_activation_delay() {
    let log = MemoryLog::new().with_activation_delay(Duration::from_secs(12));
    let cancel = CancellationToken::new();
    let options = ReadinessOptions::new(Duration::from_secs(5), Duration::from_secs(60));

    let missing = wait_until_ready("events", options, &cancel, || log.stream_status("events")).await;
    assert_eq!(missing, Err(ReadinessError::NotFound("events".to_string())));

    log.create("events", 1).await.unwrap();
    let started = tokio::time::Instant::now();
    wait_until_ready("events", options, &cancel, || log.stream_status("events"))
        .await
        .unwrap();
    // polls at 0, 5, 10, 15
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(started.elapsed() < Duration::from_secs(16));
}
