#[cfg(test)]
mod tests {
    use crate::service::{self, Backends, ServiceReport};
    use crate::service_configuration::{LoadConfiguration, ServiceConfiguration};
    use std::io::Cursor;
    use std::process::ExitCode;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::BufReader;
    use tokio_util::sync::CancellationToken;
    use tweetamo_core::table::{KeyElement, KeySchema, ScalarType, TableDefinition};
    use tweetamo_core::{ReadinessOptions, TableService};
    use tweetamo_pipeline::ShardState;
    use tweetamo_store::IndexedStore;

    const CONFIG: &str = r#"
application_name: "test-node"
log:
  stream_name: "statuses"
  shard_count: 2
  readiness:
    poll_interval_secs: 1
    timeout_secs: 5
store:
  table_name: "statuses"
  readiness:
    poll_interval_secs: 1
    timeout_secs: 5
consumer:
  batch_size: 10
  idle_interval_ms: 10
  max_retries: 1
  base_backoff_ms: 1
  max_backoff_ms: 2
"#;

    fn config() -> ServiceConfiguration {
        let load: LoadConfiguration = serde_yaml::from_str(CONFIG).unwrap();
        load.try_into().unwrap()
    }

    fn status(id: u64, author: &str, second: u32) -> String {
        format!(
            r#"{{"id":{},"created_at":"Wed Oct 10 20:19:{:02} +0000 2018","text":"status {}","user":{{"screen_name":"{}"}}}}"#,
            id, second, id, author
        )
    }

    fn input(lines: &[String]) -> BufReader<Cursor<Vec<u8>>> {
        BufReader::new(Cursor::new(lines.join("\n").into_bytes()))
    }

    /// Test: Statuses flow from the upstream input into the indexed store
    ///
    /// Flow
    /// - Run the service on three valid statuses and one broken line
    /// - Wait until the store holds three events, then request shutdown
    ///
    /// Expected
    /// - The broken line is counted as invalid, the rest is published and stored
    /// - Workers shut down cleanly and the exit code is success
    #[tokio::test]
    async fn ingests_statuses_into_the_store() {
        let backends = Backends::default();
        let cancel = CancellationToken::new();
        let lines = vec![
            status(1, "alice", 1),
            "{\"id\": broken".to_string(),
            status(2, "bob", 2),
            status(3, "alice", 3),
        ];

        let running = {
            let backends = backends.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                service::run(&config(), &backends, input(&lines), "test", cancel).await
            })
        };

        let store = IndexedStore::new(
            Arc::clone(&backends.tables),
            "statuses",
            ReadinessOptions::new(Duration::from_secs(1), Duration::from_secs(5)),
        );
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(events) = store.scan_newer_than(0, 10).await {
                    if events.len() == 3 {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("events not stored in time");

        cancel.cancel();
        let report = running.await.unwrap().unwrap();

        assert_eq!(report.source.lines, 4);
        assert_eq!(report.source.accepted, 3);
        assert_eq!(report.source.invalid, 1);
        assert_eq!(report.publisher.published, 3);
        assert_eq!(report.workers.len(), 2);
        assert!(report
            .workers
            .iter()
            .all(|w| w.state == ShardState::ShuttingDown));
        assert_eq!(report.workers.iter().map(|w| w.processed).sum::<u64>(), 3);
        assert_eq!(report.exit_code(), ExitCode::SUCCESS);

        let alice: Vec<u64> = store
            .query_by_author_since("alice", 0)
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(alice, vec![1, 3]);
    }

    async fn run_until_stored(
        config: &ServiceConfiguration,
        lines: Vec<String>,
        expected: usize,
    ) -> (ServiceReport, Vec<u64>) {
        let backends = Backends::default();
        let cancel = CancellationToken::new();
        let running = {
            let backends = backends.clone();
            let cancel = cancel.clone();
            let config = config.clone();
            tokio::spawn(async move {
                service::run(&config, &backends, input(&lines), "test", cancel).await
            })
        };

        let store = IndexedStore::new(
            Arc::clone(&backends.tables),
            "statuses",
            ReadinessOptions::new(Duration::from_secs(1), Duration::from_secs(5)),
        );
        let mut stored = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(events) = store.scan_newer_than(0, 10).await {
                    stored = events.iter().map(|e| e.id).collect();
                    if stored.len() >= expected {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        cancel.cancel();
        let report = running.await.unwrap().unwrap();
        stored.sort_unstable();
        (report, stored)
    }

    /// Test: Restarting on a persisted checkpoint directory loses nothing
    ///
    /// Purpose
    /// - The in-memory log starts over on every run, so checkpoints from the
    ///   previous run must not make the new run skip records
    ///
    /// Flow
    /// - Run with a checkpoint directory on statuses 1, 2, 3
    /// - Run again on the same directory with fresh backends and statuses 10, 11, 12
    ///
    /// Expected
    /// - Both runs store all three of their statuses
    #[tokio::test]
    async fn restart_on_checkpoint_dir_stores_new_statuses() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.checkpoint_dir = Some(dir.path().to_path_buf());

        let (first, stored) = run_until_stored(
            &config,
            vec![status(1, "alice", 1), status(2, "alice", 2), status(3, "alice", 3)],
            3,
        )
        .await;
        assert_eq!(stored, vec![1, 2, 3]);
        assert_eq!(first.exit_code(), ExitCode::SUCCESS);

        let (second, stored) = run_until_stored(
            &config,
            vec![
                status(10, "alice", 10),
                status(11, "alice", 11),
                status(12, "alice", 12),
            ],
            3,
        )
        .await;
        assert_eq!(stored, vec![10, 11, 12]);
        assert_eq!(second.workers.iter().map(|w| w.processed).sum::<u64>(), 3);
        assert_eq!(second.exit_code(), ExitCode::SUCCESS);
    }

    /// Test: A store that keeps failing stops the service with a failure exit code
    #[tokio::test]
    async fn unavailable_store_fails_the_run() {
        let backends = Backends::default();
        backends.tables.fail_next(1_000);

        let report = service::run(
            &config(),
            &backends,
            input(&[status(7, "carol", 7)]),
            "test",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.publisher.published, 1);
        assert!(report.workers.iter().any(|w| w.is_failed()));
        assert_eq!(report.exit_code(), ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn unsupported_schema_is_a_startup_error() {
        let backends = Backends::default();
        let cancel = CancellationToken::new();

        // pre-existing table with the same name but keyed by author
        backends
            .tables
            .create_table(TableDefinition {
                name: "statuses".to_string(),
                key: KeySchema {
                    hash: KeyElement::new("author", ScalarType::S),
                    range: None,
                },
                indexes: vec![],
            })
            .await
            .unwrap();

        let result = service::run(&config(), &backends, input(&[]), "test", cancel).await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("table statuses is not available"), "{}", message);
    }
}
