use chrono::DateTime;
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tweetamo_core::Event;
use tweetamo_pipeline::EventSink;

use crate::server_metrics::{SOURCE_INVALID_TOTAL, SOURCE_LINES_TOTAL};

// Twitter v1.1 timestamp, e.g. "Wed Oct 10 20:19:24 +0000 2018"
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Error)]
pub(crate) enum SourceError {
    #[error("invalid status json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid created_at {value:?}: {reason}")]
    CreatedAt { value: String, reason: String },

    #[error("status {0} has no author screen name")]
    MissingAuthor(u64),

    #[error("status {0} has no text")]
    MissingText(u64),
}

/// Statistics from one source run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SourceStats {
    pub(crate) lines: u64,
    pub(crate) accepted: u64,
    // parsed but rejected by the sink (queue full or closed)
    pub(crate) dropped: u64,
    pub(crate) invalid: u64,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: u64,
    created_at: String,
    #[serde(default)]
    text: Option<String>,
    // extended tweets carry the body here instead of `text`
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    coordinates: Option<Point>,
}

#[derive(Debug, Deserialize)]
struct User {
    screen_name: String,
}

// GeoJSON point: [longitude, latitude]
#[derive(Debug, Deserialize)]
struct Point {
    coordinates: [f64; 2],
}

/// Turn one Twitter v1.1 status object into an [`Event`].
pub(crate) fn parse_status(line: &str) -> Result<Event, SourceError> {
    let status: Status = serde_json::from_str(line)?;

    let created_at = DateTime::parse_from_str(&status.created_at, CREATED_AT_FORMAT)
        .map_err(|e| SourceError::CreatedAt {
            value: status.created_at.clone(),
            reason: e.to_string(),
        })?
        .timestamp_millis();
    let created_at = u64::try_from(created_at).map_err(|_| SourceError::CreatedAt {
        value: status.created_at.clone(),
        reason: "before the unix epoch".to_string(),
    })?;

    let author = match status.user {
        Some(user) if !user.screen_name.is_empty() => user.screen_name,
        _ => return Err(SourceError::MissingAuthor(status.id)),
    };
    let text = status
        .full_text
        .or(status.text)
        .ok_or(SourceError::MissingText(status.id))?;

    let event = Event::new(status.id, created_at, author, text);
    Ok(match status.coordinates {
        Some(Point {
            coordinates: [longitude, latitude],
        }) => event.with_location(latitude, longitude),
        None => event,
    })
}

/// JsonlSource reads one status per line and hands each event to the sink.
///
/// Bad lines are logged and counted, never propagated: the upstream callback must not fail.
pub(crate) struct JsonlSource<R> {
    reader: R,
    name: String,
}

impl<R: AsyncBufRead + Unpin> JsonlSource<R> {
    pub(crate) fn new(reader: R, name: impl Into<String>) -> Self {
        JsonlSource {
            reader,
            name: name.into(),
        }
    }

    /// Read until end of input or cancellation.
    pub(crate) async fn run(self, sink: EventSink, cancel: CancellationToken) -> SourceStats {
        let mut stats = SourceStats::default();
        let mut lines = self.reader.lines();
        info!(source = %self.name, "upstream source started");

        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(source = %self.name, error = %e, "upstream read failed, stopping source");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;
            counter!(SOURCE_LINES_TOTAL.name).increment(1);

            match parse_status(&line) {
                Ok(event) => {
                    debug!(source = %self.name, event = %event, "status received");
                    if sink.on_event(event) {
                        stats.accepted += 1;
                    } else {
                        stats.dropped += 1;
                    }
                }
                Err(e) => {
                    warn!(source = %self.name, line = stats.lines, error = %e, "skipping invalid status");
                    counter!(SOURCE_INVALID_TOTAL.name).increment(1);
                    stats.invalid += 1;
                }
            }
        }

        info!(
            source = %self.name,
            lines = stats.lines,
            accepted = stats.accepted,
            dropped = stats.dropped,
            invalid = stats.invalid,
            "upstream source finished"
        );
        stats
    }
}
