use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::TableError;
use crate::readiness::ResourceStatus;

/// A typed attribute value. Numbers are unsigned 64-bit, which covers ids and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(u64),
    B(Vec<u8>),
}

impl AttributeValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            AttributeValue::S(_) => ScalarType::S,
            AttributeValue::N(_) => ScalarType::N,
            AttributeValue::B(_) => ScalarType::B,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttributeValue::N(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::B(b) => Some(b),
            _ => None,
        }
    }
}

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    S,
    N,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyElement {
    pub attribute: String,
    pub scalar: ScalarType,
}

impl KeyElement {
    pub fn new(attribute: impl Into<String>, scalar: ScalarType) -> Self {
        KeyElement {
            attribute: attribute.into(),
            scalar,
        }
    }
}

/// Hash key plus optional range key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub hash: KeyElement,
    pub range: Option<KeyElement>,
}

/// A secondary index projecting all attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub key: KeySchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub key: KeySchema,
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub definition: TableDefinition,
    pub status: ResourceStatus,
    pub item_count: u64,
}

/// Comparison applied to a range key (queries) or to any attribute (scan filters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(AttributeValue),
    GreaterThan(AttributeValue),
    GreaterOrEqual(AttributeValue),
    /// Inclusive on both ends.
    Between(AttributeValue, AttributeValue),
}

impl Condition {
    /// Values of a different scalar type never match.
    pub fn matches(&self, value: &AttributeValue) -> bool {
        match self {
            Condition::Eq(v) => same_type(v, value) && value == v,
            Condition::GreaterThan(v) => same_type(v, value) && value > v,
            Condition::GreaterOrEqual(v) => same_type(v, value) && value >= v,
            Condition::Between(lo, hi) => {
                same_type(lo, value) && same_type(hi, value) && value >= lo && value <= hi
            }
        }
    }
}

fn same_type(a: &AttributeValue, b: &AttributeValue) -> bool {
    a.scalar_type() == b.scalar_type()
}

/// Key-condition query against the table or one of its indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub table: String,
    pub index: Option<String>,
    pub hash_value: AttributeValue,
    pub range_condition: Option<Condition>,
    pub ascending: bool,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    pub attribute: String,
    pub condition: Condition,
}

/// Full-table scan. `limit` caps the number of items *evaluated* per page, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub table: String,
    pub filter: Option<ScanFilter>,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

/// One page of results; `last_evaluated_key` is set when more pages remain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// An indexed key-value table service (DynamoDB-like).
#[async_trait]
pub trait TableService: Send + Sync + 'static {
    async fn describe_table(&self, table: &str) -> Result<TableDescription, TableError>;

    async fn create_table(&self, definition: TableDefinition) -> Result<(), TableError>;

    /// Insert or fully replace the item with the same primary key.
    async fn put_item(&self, table: &str, item: Item) -> Result<(), TableError>;

    /// Point lookup; `key` holds only the primary key attributes.
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>, TableError>;

    async fn query(&self, request: QueryRequest) -> Result<Page, TableError>;

    async fn scan(&self, request: ScanRequest) -> Result<Page, TableError>;

    /// Status probe for the readiness waiter: a missing table is a status, not an error.
    async fn table_status(&self, table: &str) -> Result<ResourceStatus, TableError> {
        match self.describe_table(table).await {
            Ok(description) => Ok(description.status),
            Err(TableError::TableNotFound(_)) => Ok(ResourceStatus::NotFound),
            Err(e) => Err(e),
        }
    }
}
