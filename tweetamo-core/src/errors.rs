use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported codec version {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("field {tag} has invalid length {len}")]
    InvalidLength { tag: u8, len: usize },

    #[error("field {0} appears more than once")]
    DuplicateField(u8),

    #[error("required field {0} is missing")]
    MissingField(&'static str),

    #[error("field {0} is not valid utf-8")]
    InvalidUtf8(&'static str),

    #[error("author must not be empty")]
    EmptyAuthor,

    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("resource {resource} not active after {waited:?}")]
    Timeout { resource: String, waited: Duration },

    #[error("resource {0} does not exist")]
    NotFound(String),

    #[error("wait for resource {0} was cancelled")]
    Cancelled(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("log service unavailable: {0}")]
    Unavailable(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("stream already exists: {0}")]
    StreamExists(String),

    #[error("stream {0} is not active")]
    NotActive(String),

    #[error("shard not found: {0}")]
    ShardNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl LogError {
    /// Network blips and throttling are retried; everything else is definitive.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogError::Unavailable(_) | LogError::Throttled(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table service unavailable: {0}")]
    Unavailable(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl TableError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TableError::Unavailable(_) | TableError::Throttled(_))
    }
}
