use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tweetamo_core::table::{Condition, QueryRequest, ScanFilter, ScanRequest, TableDefinition};
use tweetamo_core::{
    wait_until_ready, AttributeValue, Event, ReadinessOptions, TableError, TableService,
};

use crate::errors::{Result, StoreError};
use crate::schema::{self, AUTHOR_INDEX, CREATED_AT_ATTR};

// items requested per backend page while following pagination
const DEFAULT_PAGE_SIZE: usize = 100;

/// IndexedStore persists events into a table keyed by id and indexed by author + creation time.
///
/// The handle holds no client-side locks; share it across shard workers behind an `Arc`.
#[derive(Debug)]
pub struct IndexedStore<T: TableService> {
    tables: Arc<T>,
    definition: TableDefinition,
    readiness: ReadinessOptions,
    page_size: usize,
}

impl<T: TableService> IndexedStore<T> {
    pub fn new(tables: Arc<T>, table_name: &str, readiness: ReadinessOptions) -> Self {
        IndexedStore {
            tables,
            definition: schema::table_definition(table_name),
            readiness,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size used for queries and scans against the backend.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.definition.name
    }

    /// Make sure the table exists with the expected schema and is ACTIVE.
    ///
    /// Creates the table when absent and waits for it. Safe to call repeatedly and
    /// from several processes: losing a creation race counts as success.
    pub async fn ensure_schema(&self, cancel: &CancellationToken) -> Result<()> {
        let name = self.table_name();
        match self.tables.describe_table(name).await {
            Ok(description) => {
                schema::check_compatible(&self.definition, &description.definition)?;
                debug!(target = "store", table = %name, status = ?description.status, "table exists");
            }
            Err(TableError::TableNotFound(_)) => {
                info!(target = "store", table = %name, "creating table");
                match self.tables.create_table(self.definition.clone()).await {
                    Ok(()) => {}
                    Err(TableError::TableExists(_)) => {
                        info!(target = "store", table = %name, "table created concurrently");
                        let description = self.tables.describe_table(name).await?;
                        schema::check_compatible(&self.definition, &description.definition)?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        wait_until_ready(name, self.readiness, cancel, || self.tables.table_status(name)).await?;
        Ok(())
    }

    /// Upsert by id; the last write wins.
    pub async fn put(&self, event: &Event) -> Result<()> {
        if event.author.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "event {} has an empty author",
                event.id
            )));
        }
        self.tables
            .put_item(self.table_name(), schema::to_item(event))
            .await?;
        Ok(())
    }

    /// Point lookup by event id.
    pub async fn get(&self, id: u64) -> Result<Option<Event>> {
        let item = self
            .tables
            .get_item(self.table_name(), schema::primary_key(id))
            .await?;
        item.as_ref().map(schema::from_item).transpose()
    }

    /// Events of `author` created in `[since, now]`, oldest first.
    pub async fn query_by_author_since(&self, author: &str, since: u64) -> Result<Vec<Event>> {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.query_by_author_between(author, since, now).await
    }

    /// Events of `author` created in `[from, to]` (inclusive), oldest first.
    ///
    /// Served by the author index only and follows pagination to the end.
    pub async fn query_by_author_between(
        &self,
        author: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<Event>> {
        if author.is_empty() {
            return Err(StoreError::InvalidArgument("author must not be empty".to_string()));
        }
        if from > to {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .tables
                .query(QueryRequest {
                    table: self.table_name().to_string(),
                    index: Some(AUTHOR_INDEX.to_string()),
                    hash_value: AttributeValue::S(author.to_string()),
                    range_condition: Some(Condition::Between(
                        AttributeValue::N(from),
                        AttributeValue::N(to),
                    )),
                    ascending: true,
                    limit: Some(self.page_size),
                    exclusive_start_key: cursor.take(),
                })
                .await?;
            for item in &page.items {
                events.push(schema::from_item(item)?);
            }
            match page.last_evaluated_key {
                Some(key) => cursor = Some(key),
                None => break,
            }
        }

        debug!(target = "store", author = %author, from, to, found = events.len(), "author query");
        Ok(events)
    }

    /// Up to `limit` events created strictly after `since`, in no particular order.
    ///
    /// This is a full table scan; prefer the author query whenever an author is known.
    pub async fn scan_newer_than(&self, since: u64, limit: usize) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        if limit == 0 {
            return Ok(events);
        }

        let mut cursor = None;
        loop {
            let page = self
                .tables
                .scan(ScanRequest {
                    table: self.table_name().to_string(),
                    filter: Some(ScanFilter {
                        attribute: CREATED_AT_ATTR.to_string(),
                        condition: Condition::GreaterThan(AttributeValue::N(since)),
                    }),
                    limit: Some(self.page_size),
                    exclusive_start_key: cursor.take(),
                })
                .await?;
            for item in &page.items {
                match schema::from_item(item) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(target = "store", error = %e, "skipping corrupt item during scan");
                    }
                }
                if events.len() == limit {
                    return Ok(events);
                }
            }
            match page.last_evaluated_key {
                Some(key) => cursor = Some(key),
                None => return Ok(events),
            }
        }
    }
}
