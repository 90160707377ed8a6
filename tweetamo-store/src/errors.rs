use thiserror::Error;
use tweetamo_core::{ReadinessError, TableError};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("existing table has an incompatible schema: {0}")]
    SchemaMismatch(String),

    #[error("table or index not found: {0}")]
    NotFound(String),

    #[error("table did not become ready: {0}")]
    NotReady(#[from] ReadinessError),

    #[error("stored item is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Only backend availability problems are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Unavailable(msg) | TableError::Throttled(msg) => {
                StoreError::Unavailable(msg)
            }
            TableError::TableNotFound(name) | TableError::IndexNotFound(name) => {
                StoreError::NotFound(name)
            }
            TableError::TableExists(name) => {
                StoreError::InvalidArgument(format!("table {} already exists", name))
            }
            TableError::Validation(msg) => StoreError::InvalidArgument(msg),
        }
    }
}
