#![allow(dead_code)]

use tweetamo_core::Event;

/// Build a batch of events for one author, `created_at` starting at `start` and stepping by 100ms.
pub fn author_events(author: &str, first_id: u64, start: u64, count: usize) -> Vec<Event> {
    (0..count as u64)
        .map(|i| {
            Event::new(
                first_id + i,
                start + i * 100,
                author,
                format!("status {} from {}", first_id + i, author),
            )
        })
        .collect()
}
