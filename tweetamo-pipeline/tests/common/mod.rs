#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tweetamo_core::Event;
use tweetamo_pipeline::{ProcessError, RecordProcessor};

/// Records every event it is handed, grouped by author.
#[derive(Default)]
pub struct CollectingProcessor {
    by_author: Mutex<HashMap<String, Vec<u64>>>,
}

impl CollectingProcessor {
    pub fn ids_of(&self, author: &str) -> Vec<u64> {
        self.by_author
            .lock()
            .unwrap()
            .get(author)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.by_author.lock().unwrap().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl RecordProcessor for CollectingProcessor {
    async fn process(&self, _shard_id: &str, event: &Event) -> Result<(), ProcessError> {
        self.by_author
            .lock()
            .unwrap()
            .entry(event.author.clone())
            .or_default()
            .push(event.id);
        Ok(())
    }
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
