#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tweetamo_core::providers::MemoryTable;
use tweetamo_core::ReadinessOptions;
use tweetamo_store::IndexedStore;

pub const TABLE: &str = "tweetamo_status";

/// A store over a fresh in-memory table, polling every second for up to a minute.
pub fn memory_store(tables: &Arc<MemoryTable>) -> IndexedStore<MemoryTable> {
    IndexedStore::new(
        Arc::clone(tables),
        TABLE,
        ReadinessOptions::new(Duration::from_secs(1), Duration::from_secs(60)),
    )
}
