mod event;
pub use event::{Event, GeoLocation};

pub mod codec;
pub use codec::{decode, encode};

pub mod errors;
pub use errors::{CodecError, LogError, ReadinessError, TableError};

// Readiness polling shared by the log and the store
pub mod readiness;
pub use readiness::{wait_until_ready, ReadinessOptions, ResourceStatus};

mod retry;
pub use retry::RetryPolicy;

// Collaborator traits for the external services
pub mod log;
pub use log::{LogRecord, PartitionedLog, PublishReceipt, PullBatch, ShardIterator};
pub mod table;
pub use table::{AttributeValue, Item, TableService};

// In-memory implementations of the collaborator traits
pub mod providers;
