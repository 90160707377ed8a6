use crate::errors::TableError;
use crate::providers::MemoryTable;
use crate::table::{
    AttributeValue, Condition, IndexDefinition, Item, KeyElement, KeySchema, QueryRequest,
    ScalarType, ScanFilter, ScanRequest, TableDefinition, TableService,
};

fn definition() -> TableDefinition {
    TableDefinition {
        name: "events".to_string(),
        key: KeySchema {
            hash: KeyElement::new("id", ScalarType::N),
            range: None,
        },
        indexes: vec![IndexDefinition {
            name: "by-author".to_string(),
            key: KeySchema {
                hash: KeyElement::new("author", ScalarType::S),
                range: Some(KeyElement::new("ts", ScalarType::N)),
            },
        }],
    }
}

fn item(id: u64, author: &str, ts: u64) -> Item {
    let mut item = Item::new();
    item.insert("id".to_string(), AttributeValue::N(id));
    item.insert("author".to_string(), AttributeValue::S(author.to_string()));
    item.insert("ts".to_string(), AttributeValue::N(ts));
    item
}

fn ids(items: &[Item]) -> Vec<u64> {
    items
        .iter()
        .map(|i| i.get("id").and_then(|v| v.as_u64()).unwrap())
        .collect()
}

fn author_query(author: &str) -> QueryRequest {
    QueryRequest {
        table: "events".to_string(),
        index: Some("by-author".to_string()),
        hash_value: AttributeValue::S(author.to_string()),
        range_condition: None,
        ascending: true,
        limit: None,
        exclusive_start_key: None,
    }
}

async fn seeded() -> MemoryTable {
    let table = MemoryTable::new();
    table.create_table(definition()).await.unwrap();
    // inserted out of timestamp order on purpose
    for (id, author, ts) in [
        (3, "alice", 300),
        (1, "alice", 100),
        (9, "bob", 150),
        (2, "alice", 200),
    ] {
        table.put_item("events", item(id, author, ts)).await.unwrap();
    }
    table
}

#[tokio::test]
async fn test_index_query_orders_by_range_key() {
    let table = seeded().await;

    let page = table.query(author_query("alice")).await.unwrap();
    assert_eq!(ids(&page.items), vec![1, 2, 3]);
    assert!(page.last_evaluated_key.is_none());

    let mut desc = author_query("alice");
    desc.ascending = false;
    desc.range_condition = Some(Condition::Between(
        AttributeValue::N(150),
        AttributeValue::N(300),
    ));
    let page = table.query(desc).await.unwrap();
    assert_eq!(ids(&page.items), vec![3, 2]);
}

/// Test: Overwrite moves the item inside the secondary index
///
/// Purpose
/// - An out-of-order re-delivery that changes the range key must not leave a stale index entry
///
/// Expected
/// - The item appears exactly once, at its new position
#[tokio::test]
async fn test_overwrite_reindexes_item() {
    let table = seeded().await;
    table.put_item("events", item(1, "alice", 250)).await.unwrap();

    let page = table.query(author_query("alice")).await.unwrap();
    assert_eq!(ids(&page.items), vec![2, 1, 3]);

    table.put_item("events", item(1, "carol", 250)).await.unwrap();
    let page = table.query(author_query("alice")).await.unwrap();
    assert_eq!(ids(&page.items), vec![2, 3]);
    let page = table.query(author_query("carol")).await.unwrap();
    assert_eq!(ids(&page.items), vec![1]);

    let description = table.describe_table("events").await.unwrap();
    assert_eq!(description.item_count, 4);
}

#[tokio::test]
async fn test_query_pagination_resumes_after_cursor() {
    let table = seeded().await;
    let mut request = author_query("alice");
    request.limit = Some(2);

    let first = table.query(request.clone()).await.unwrap();
    assert_eq!(ids(&first.items), vec![1, 2]);
    let cursor = first.last_evaluated_key.expect("more pages");

    request.exclusive_start_key = Some(cursor);
    let second = table.query(request).await.unwrap();
    assert_eq!(ids(&second.items), vec![3]);
    assert!(second.last_evaluated_key.is_none());
}

#[tokio::test]
async fn test_scan_limit_counts_evaluated_items() {
    let table = seeded().await;
    let filter = Some(ScanFilter {
        attribute: "ts".to_string(),
        condition: Condition::GreaterThan(AttributeValue::N(120)),
    });

    let mut collected = Vec::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let page = table
            .scan(ScanRequest {
                table: "events".to_string(),
                filter: filter.clone(),
                limit: Some(1),
                exclusive_start_key: cursor.take(),
            })
            .await
            .unwrap();
        pages += 1;
        assert!(page.items.len() <= 1);
        collected.extend(ids(&page.items));
        match page.last_evaluated_key {
            Some(k) => cursor = Some(k),
            None => break,
        }
    }
    collected.sort();
    assert_eq!(collected, vec![2, 3, 9]);
    assert_eq!(pages, 4);
}

#[tokio::test]
async fn test_validation_and_missing_resources() {
    let table = seeded().await;

    let mut bad = item(5, "dave", 1);
    bad.insert("id".to_string(), AttributeValue::S("five".to_string()));
    assert!(matches!(
        table.put_item("events", bad).await,
        Err(TableError::Validation(_))
    ));

    let mut request = author_query("alice");
    request.index = Some("nope".to_string());
    assert_eq!(
        table.query(request).await,
        Err(TableError::IndexNotFound("nope".to_string()))
    );

    assert_eq!(
        table.put_item("other", item(1, "a", 1)).await,
        Err(TableError::TableNotFound("other".to_string()))
    );
    assert_eq!(
        table.create_table(definition()).await,
        Err(TableError::TableExists("events".to_string()))
    );
}

#[tokio::test]
async fn test_sparse_index_and_point_lookup() {
    let table = seeded().await;
    let mut no_author = Item::new();
    no_author.insert("id".to_string(), AttributeValue::N(77));
    table.put_item("events", no_author).await.unwrap();

    let mut key = Item::new();
    key.insert("id".to_string(), AttributeValue::N(77));
    assert!(table.get_item("events", key).await.unwrap().is_some());

    let mut key = Item::new();
    key.insert("id".to_string(), AttributeValue::N(78));
    assert!(table.get_item("events", key).await.unwrap().is_none());

    table.fail_next(1);
    assert!(table
        .query(author_query("alice"))
        .await
        .unwrap_err()
        .is_retryable());
}
