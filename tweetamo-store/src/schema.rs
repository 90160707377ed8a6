use tweetamo_core::table::{IndexDefinition, KeyElement, KeySchema, ScalarType, TableDefinition};
use tweetamo_core::{decode, encode, AttributeValue, Event, Item};

use crate::errors::{Result, StoreError};

pub const ID_ATTR: &str = "id";
pub const AUTHOR_ATTR: &str = "author";
pub const CREATED_AT_ATTR: &str = "createdAt";
// codec payload of the whole event
pub const EVENT_ATTR: &str = "event";

/// Secondary index serving the author + time window lookups.
pub const AUTHOR_INDEX: &str = "author-created-at-index";

/// The table layout the store expects: primary key `id`, plus the author index.
pub fn table_definition(table_name: &str) -> TableDefinition {
    TableDefinition {
        name: table_name.to_string(),
        key: KeySchema {
            hash: KeyElement::new(ID_ATTR, ScalarType::N),
            range: None,
        },
        indexes: vec![IndexDefinition {
            name: AUTHOR_INDEX.to_string(),
            key: KeySchema {
                hash: KeyElement::new(AUTHOR_ATTR, ScalarType::S),
                range: Some(KeyElement::new(CREATED_AT_ATTR, ScalarType::N)),
            },
        }],
    }
}

/// Check that an existing table can serve the store.
///
/// The primary key must match exactly and the author index must exist with the
/// expected keys. Additional indexes are ignored.
pub fn check_compatible(expected: &TableDefinition, actual: &TableDefinition) -> Result<()> {
    if actual.key != expected.key {
        return Err(StoreError::SchemaMismatch(format!(
            "table {} has primary key {:?}, expected {:?}",
            actual.name, actual.key, expected.key
        )));
    }
    for index in &expected.indexes {
        match actual.index(&index.name) {
            Some(found) if found.key == index.key => {}
            Some(found) => {
                return Err(StoreError::SchemaMismatch(format!(
                    "index {} has key {:?}, expected {:?}",
                    index.name, found.key, index.key
                )))
            }
            None => {
                return Err(StoreError::SchemaMismatch(format!(
                    "table {} is missing index {}",
                    actual.name, index.name
                )))
            }
        }
    }
    Ok(())
}

pub fn primary_key(id: u64) -> Item {
    let mut key = Item::new();
    key.insert(ID_ATTR.to_string(), AttributeValue::N(id));
    key
}

pub fn to_item(event: &Event) -> Item {
    let mut item = primary_key(event.id);
    item.insert(
        AUTHOR_ATTR.to_string(),
        AttributeValue::S(event.author.clone()),
    );
    item.insert(
        CREATED_AT_ATTR.to_string(),
        AttributeValue::N(event.created_at),
    );
    item.insert(EVENT_ATTR.to_string(), AttributeValue::B(encode(event)));
    item
}

pub fn from_item(item: &Item) -> Result<Event> {
    let id = item.get(ID_ATTR).and_then(AttributeValue::as_u64);
    let payload = item
        .get(EVENT_ATTR)
        .and_then(AttributeValue::as_bytes)
        .ok_or_else(|| StoreError::Corrupt(format!("item {:?} has no event payload", id)))?;
    let event =
        decode(payload).map_err(|e| StoreError::Corrupt(format!("item {:?}: {}", id, e)))?;
    if id != Some(event.id) {
        return Err(StoreError::Corrupt(format!(
            "item key {:?} does not match event id {}",
            id, event.id
        )));
    }
    Ok(event)
}
