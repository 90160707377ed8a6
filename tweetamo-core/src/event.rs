use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Geographic position attached to a status update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoLocation {
            latitude,
            longitude,
        }
    }
}

/// One social-media status update, as it travels through the log and lands in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    // globally unique id assigned by the upstream source, primary key in the store
    pub id: u64,
    // creation time in milliseconds since the unix epoch
    pub created_at: u64,
    // screen name of the author, also the partition key on the log
    pub author: String,
    // the status body
    pub text: String,
    // absent when the upstream status carries no geo-tag
    pub location: Option<GeoLocation>,
}

impl Event {
    pub fn new(id: u64, created_at: u64, author: impl Into<String>, text: impl Into<String>) -> Self {
        Event {
            id,
            created_at,
            author: author.into(),
            text: text.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoLocation::new(latitude, longitude));
        self
    }

    /// The key used to route this event to a log shard.
    pub fn partition_key(&self) -> &str {
        &self.author
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event:_{}_author:_{}_created_at:_{}",
            self.id, self.author, self.created_at
        )
    }
}
