use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;
use tweetamo_core::{Event, TableService};
use tweetamo_pipeline::{ProcessError, RecordProcessor};
use tweetamo_store::IndexedStore;

/// Writes every consumed event into the indexed store.
///
/// Store errors are classified here, so the shard workers never look at backend codes.
pub(crate) struct StoreProcessor<T: TableService> {
    store: Arc<IndexedStore<T>>,
}

impl<T: TableService> StoreProcessor<T> {
    pub(crate) fn new(store: Arc<IndexedStore<T>>) -> Self {
        StoreProcessor { store }
    }
}

#[async_trait]
impl<T: TableService> RecordProcessor for StoreProcessor<T> {
    async fn process(&self, shard_id: &str, event: &Event) -> Result<(), ProcessError> {
        match self.store.put(event).await {
            Ok(()) => {
                trace!(target = "store", shard = %shard_id, event = %event, "event stored");
                Ok(())
            }
            Err(e) if e.is_retryable() => Err(ProcessError::Transient(e.to_string())),
            Err(e) => Err(ProcessError::Fatal(e.to_string())),
        }
    }
}
