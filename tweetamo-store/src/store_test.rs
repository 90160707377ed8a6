#[cfg(test)]
mod tests {
    use crate::schema::{self, AUTHOR_INDEX};
    use crate::{IndexedStore, StoreError};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tweetamo_core::providers::MemoryTable;
    use tweetamo_core::table::{KeyElement, KeySchema, ScalarType, TableDefinition};
    use tweetamo_core::{Event, ReadinessError, ReadinessOptions, TableService};

    const TABLE: &str = "tweetamo_status";

    fn fast_readiness() -> ReadinessOptions {
        ReadinessOptions::new(Duration::from_secs(1), Duration::from_secs(10))
    }

    async fn ready_store() -> (Arc<MemoryTable>, IndexedStore<MemoryTable>) {
        let tables = Arc::new(MemoryTable::new());
        let store = IndexedStore::new(Arc::clone(&tables), TABLE, fast_readiness());
        store.ensure_schema(&CancellationToken::new()).await.unwrap();
        (tables, store)
    }

    /// Test: Schema provisioning waits for the table to turn ACTIVE
    ///
    /// Purpose
    /// - `ensure_schema` creates a missing table and blocks until the backend reports it ready
    ///
    /// Flow
    /// - Backend activates tables 30s after creation, store polls every 20s
    /// - Call `ensure_schema` twice
    ///
    /// Expected
    /// - First call returns after the 40s poll; the second returns immediately
    /// - The created table carries the author index
    #[tokio::test(start_paused = true)]
    async fn test_ensure_schema_creates_and_waits() {
        let tables = Arc::new(MemoryTable::new().with_activation_delay(Duration::from_secs(30)));
        let store = IndexedStore::new(Arc::clone(&tables), TABLE, ReadinessOptions::for_table());
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        store.ensure_schema(&cancel).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(40));
        assert!(started.elapsed() < Duration::from_secs(41));

        let again = tokio::time::Instant::now();
        store.ensure_schema(&cancel).await.unwrap();
        assert_eq!(again.elapsed(), Duration::ZERO);

        let description = tables.describe_table(TABLE).await.unwrap();
        assert!(description.definition.index(AUTHOR_INDEX).is_some());
    }

    #[tokio::test]
    async fn test_incompatible_table_is_schema_mismatch() {
        let tables = Arc::new(MemoryTable::new());
        tables
            .create_table(TableDefinition {
                name: TABLE.to_string(),
                key: KeySchema {
                    hash: KeyElement::new("author", ScalarType::S),
                    range: None,
                },
                indexes: vec![],
            })
            .await
            .unwrap();
        let store = IndexedStore::new(Arc::clone(&tables), TABLE, fast_readiness());

        let result = store.ensure_schema(&CancellationToken::new()).await;
        assert!(matches!(result, Err(StoreError::SchemaMismatch(_))));
        assert!(!result.unwrap_err().is_retryable());

        // right primary key but no author index
        let other = "no_index";
        let mut definition = schema::table_definition(other);
        definition.indexes.clear();
        tables.create_table(definition).await.unwrap();
        let store = IndexedStore::new(tables, other, fast_readiness());
        assert!(matches!(
            store.ensure_schema(&CancellationToken::new()).await,
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_is_not_ready() {
        let tables = Arc::new(MemoryTable::new().with_activation_delay(Duration::from_secs(600)));
        let store = IndexedStore::new(tables, TABLE, ReadinessOptions::for_table());
        let cancel = CancellationToken::new();
        let cancel_c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            cancel_c.cancel();
        });

        assert_eq!(
            store.ensure_schema(&cancel).await,
            Err(StoreError::NotReady(ReadinessError::Cancelled(
                TABLE.to_string()
            )))
        );
    }

    /// Test: Writing the same event twice is idempotent
    ///
    /// Expected
    /// - One item in the table, and lookup by id returns the event unchanged
    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (tables, store) = ready_store().await;
        let event = Event::new(42, 1_000, "alice", "hello").with_location(40.4, -3.7);

        store.put(&event).await.unwrap();
        store.put(&event).await.unwrap();

        assert_eq!(tables.describe_table(TABLE).await.unwrap().item_count, 1);
        assert_eq!(store.get(42).await.unwrap(), Some(event));
        assert_eq!(store.get(43).await.unwrap(), None);
    }

    /// Test: Range query by author
    ///
    /// Purpose
    /// - Only the author's events inside the window come back, oldest first
    ///
    /// Flow
    /// - alice at 100, 200, 300 (written out of order) and bob at 250
    /// - Query alice since 150
    ///
    /// Expected
    /// - [200, 300]
    #[tokio::test]
    async fn test_query_by_author_since() {
        let (_tables, store) = ready_store().await;
        let store = store.with_page_size(1);
        for event in [
            Event::new(3, 300, "alice", "c"),
            Event::new(1, 100, "alice", "a"),
            Event::new(4, 250, "bob", "x"),
            Event::new(2, 200, "alice", "b"),
        ] {
            store.put(&event).await.unwrap();
        }

        let found = store.query_by_author_since("alice", 150).await.unwrap();
        let times: Vec<u64> = found.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![200, 300]);

        let bounded = store.query_by_author_between("alice", 100, 200).await.unwrap();
        let ids: Vec<u64> = bounded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(store
            .query_by_author_between("alice", 400, 100)
            .await
            .unwrap()
            .is_empty());
        assert!(store.query_by_author_since("carol", 0).await.unwrap().is_empty());
    }

    /// Test: Out-of-order overwrite keeps the author index consistent
    ///
    /// Flow
    /// - Write id 7 at createdAt 300, then a late correction of id 7 at createdAt 100
    ///
    /// Expected
    /// - The author query returns id 7 exactly once, with the latest write
    #[tokio::test]
    async fn test_overwrite_keeps_index_consistent() {
        let (_tables, store) = ready_store().await;
        store.put(&Event::new(7, 300, "alice", "first")).await.unwrap();
        store.put(&Event::new(7, 100, "alice", "second")).await.unwrap();

        let found = store.query_by_author_since("alice", 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].created_at, 100);
        assert_eq!(found[0].text, "second");

        assert!(store
            .query_by_author_between("alice", 200, 400)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scan_newer_than_is_capped() {
        let (_tables, store) = ready_store().await;
        let store = store.with_page_size(2);
        for id in 1..=10u64 {
            let author = if id % 2 == 0 { "alice" } else { "bob" };
            store
                .put(&Event::new(id, id * 10, author, "t"))
                .await
                .unwrap();
        }

        let newer = store.scan_newer_than(50, 3).await.unwrap();
        assert_eq!(newer.len(), 3);
        assert!(newer.iter().all(|e| e.created_at > 50));

        let all_newer = store.scan_newer_than(50, 100).await.unwrap();
        let mut ids: Vec<u64> = all_newer.iter().map(|e| e.id).collect();
        ids.sort();
        assert_eq!(ids, vec![6, 7, 8, 9, 10]);

        assert!(store.scan_newer_than(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_errors_are_classified() {
        let tables = Arc::new(MemoryTable::new());
        let store = IndexedStore::new(Arc::clone(&tables), TABLE, fast_readiness());
        let event = Event::new(1, 1, "alice", "t");

        let missing = store.put(&event).await.unwrap_err();
        assert_eq!(missing, StoreError::NotFound(TABLE.to_string()));
        assert!(!missing.is_retryable());

        store.ensure_schema(&CancellationToken::new()).await.unwrap();
        tables.fail_next(1);
        assert!(store.put(&event).await.unwrap_err().is_retryable());
        store.put(&event).await.unwrap();

        assert!(matches!(
            store.put(&Event::new(2, 1, "", "t")).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
