use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::TableError;
use crate::readiness::ResourceStatus;
use crate::table::{
    AttributeValue, IndexDefinition, Item, KeyElement, KeySchema, Page, QueryRequest,
    ScanRequest, TableDefinition, TableDescription, TableService,
};

// (hash value, range value)
type PrimaryKey = (AttributeValue, Option<AttributeValue>);
// position of an item inside an index partition: (range value, primary key)
type SortKey = (Option<AttributeValue>, PrimaryKey);

#[derive(Debug)]
struct IndexState {
    definition: IndexDefinition,
    // index hash value -> entries ordered by index range value
    partitions: BTreeMap<AttributeValue, BTreeSet<SortKey>>,
}

#[derive(Debug)]
struct TableState {
    definition: TableDefinition,
    created: Instant,
    items: BTreeMap<PrimaryKey, Item>,
    indexes: Vec<IndexState>,
}

/// MemoryTable is an in-process table service implementing [`TableService`].
///
/// Secondary indexes are maintained eagerly on every put, including moving an
/// item between index partitions when an overwrite changes its index keys.
/// Items missing an index attribute are left out of that index (sparse index).
#[derive(Debug, Clone)]
pub struct MemoryTable {
    tables: Arc<DashMap<String, TableState>>,
    activation_delay: Duration,
    injected_failures: Arc<AtomicUsize>,
}

impl MemoryTable {
    pub fn new() -> Self {
        MemoryTable {
            tables: Arc::new(DashMap::new()),
            activation_delay: Duration::ZERO,
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Newly created tables report `Creating` until `delay` has passed.
    pub fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }

    /// Make the next `n` data-plane calls fail with [`TableError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.injected_failures.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Result<(), TableError> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(TableError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn status_of(&self, state: &TableState) -> ResourceStatus {
        if state.created.elapsed() < self.activation_delay {
            ResourceStatus::Creating
        } else {
            ResourceStatus::Active
        }
    }

    fn ensure_active(&self, name: &str, state: &TableState) -> Result<(), TableError> {
        match self.status_of(state) {
            ResourceStatus::Active => Ok(()),
            _ => Err(TableError::Unavailable(format!("table {} is not active", name))),
        }
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

fn key_attribute(
    element: &KeyElement,
    item: &Item,
    required: bool,
) -> Result<Option<AttributeValue>, TableError> {
    match item.get(&element.attribute) {
        Some(value) if value.scalar_type() == element.scalar => Ok(Some(value.clone())),
        Some(_) => Err(TableError::Validation(format!(
            "key attribute {} must be of type {:?}",
            element.attribute, element.scalar
        ))),
        None if required => Err(TableError::Validation(format!(
            "missing key attribute {}",
            element.attribute
        ))),
        None => Ok(None),
    }
}

fn primary_key(schema: &KeySchema, item: &Item) -> Result<PrimaryKey, TableError> {
    let hash = key_attribute(&schema.hash, item, true)?.ok_or_else(|| {
        TableError::Validation(format!("missing key attribute {}", schema.hash.attribute))
    })?;
    let range = match &schema.range {
        Some(element) => key_attribute(element, item, true)?,
        None => None,
    };
    Ok((hash, range))
}

/// Index placement of an item, or `None` when the item lacks the index keys.
fn index_entry(
    index: &IndexDefinition,
    item: &Item,
    pk: &PrimaryKey,
) -> Result<Option<(AttributeValue, SortKey)>, TableError> {
    let hash = match key_attribute(&index.key.hash, item, false)? {
        Some(h) => h,
        None => return Ok(None),
    };
    let range = match &index.key.range {
        Some(element) => match key_attribute(element, item, false)? {
            Some(r) => Some(r),
            None => return Ok(None),
        },
        None => None,
    };
    Ok(Some((hash, (range, pk.clone()))))
}

/// Copy of the attributes that identify an item's position, used as a page cursor.
fn cursor_item(schemas: &[&KeySchema], item: &Item) -> Item {
    let mut out = Item::new();
    for schema in schemas {
        for element in std::iter::once(&schema.hash).chain(schema.range.iter()) {
            if let Some(v) = item.get(&element.attribute) {
                out.insert(element.attribute.clone(), v.clone());
            }
        }
    }
    out
}

impl TableState {
    fn put(&mut self, item: Item) -> Result<(), TableError> {
        let pk = primary_key(&self.definition.key, &item)?;
        let new_entries = self
            .indexes
            .iter()
            .map(|ix| index_entry(&ix.definition, &item, &pk))
            .collect::<Result<Vec<_>, _>>()?;

        let TableState { items, indexes, .. } = self;
        if let Some(old) = items.get(&pk) {
            for ix in indexes.iter_mut() {
                if let Ok(Some((hash, sort))) = index_entry(&ix.definition, old, &pk) {
                    if let Some(partition) = ix.partitions.get_mut(&hash) {
                        partition.remove(&sort);
                        if partition.is_empty() {
                            ix.partitions.remove(&hash);
                        }
                    }
                }
            }
        }
        for (ix, entry) in indexes.iter_mut().zip(new_entries) {
            if let Some((hash, sort)) = entry {
                ix.partitions.entry(hash).or_default().insert(sort);
            }
        }
        items.insert(pk, item);
        Ok(())
    }

    fn query(&self, request: &QueryRequest) -> Result<Page, TableError> {
        let (key_schema, candidates): (&KeySchema, Vec<SortKey>) = match &request.index {
            None => {
                let schema = &self.definition.key;
                check_type(&schema.hash, &request.hash_value)?;
                let start: PrimaryKey = (request.hash_value.clone(), None);
                let rows = self
                    .items
                    .range(start..)
                    .take_while(|(pk, _)| pk.0 == request.hash_value)
                    .map(|(pk, _)| (pk.1.clone(), pk.clone()))
                    .collect();
                (schema, rows)
            }
            Some(name) => {
                let ix = self
                    .indexes
                    .iter()
                    .find(|ix| &ix.definition.name == name)
                    .ok_or_else(|| TableError::IndexNotFound(name.clone()))?;
                check_type(&ix.definition.key.hash, &request.hash_value)?;
                let rows = ix
                    .partitions
                    .get(&request.hash_value)
                    .map(|p| p.iter().cloned().collect())
                    .unwrap_or_default();
                (&ix.definition.key, rows)
            }
        };

        let mut rows: Vec<SortKey> = candidates
            .into_iter()
            .filter(|(range, _)| match &request.range_condition {
                None => true,
                Some(cond) => range.as_ref().map(|r| cond.matches(r)).unwrap_or(false),
            })
            .collect();
        if !request.ascending {
            rows.reverse();
        }

        if let Some(start) = &request.exclusive_start_key {
            let start_pk = primary_key(&self.definition.key, start)?;
            let start_range = match &key_schema.range {
                Some(element) => start.get(&element.attribute).cloned(),
                None => None,
            };
            let start_pos = (start_range, start_pk);
            rows.retain(|row| {
                if request.ascending {
                    *row > start_pos
                } else {
                    *row < start_pos
                }
            });
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let more = rows.len() > limit;
        let items: Vec<Item> = rows
            .into_iter()
            .take(limit)
            .filter_map(|(_, pk)| self.items.get(&pk).cloned())
            .collect();

        let last_evaluated_key = if more {
            items
                .last()
                .map(|last| cursor_item(&[&self.definition.key, key_schema], last))
        } else {
            None
        };
        Ok(Page {
            items,
            last_evaluated_key,
        })
    }

    fn scan(&self, request: &ScanRequest) -> Result<Page, TableError> {
        let start = match &request.exclusive_start_key {
            Some(key) => Some(primary_key(&self.definition.key, key)?),
            None => None,
        };
        let limit = request.limit.unwrap_or(usize::MAX).max(1);

        let mut evaluated = 0usize;
        let mut last_pk: Option<&PrimaryKey> = None;
        let mut items = Vec::new();
        let mut remaining = self
            .items
            .iter()
            .filter(|(pk, _)| start.as_ref().map(|s| *pk > s).unwrap_or(true))
            .peekable();

        while evaluated < limit {
            let Some((pk, item)) = remaining.next() else {
                break;
            };
            evaluated += 1;
            last_pk = Some(pk);
            let keep = match &request.filter {
                None => true,
                Some(filter) => item
                    .get(&filter.attribute)
                    .map(|v| filter.condition.matches(v))
                    .unwrap_or(false),
            };
            if keep {
                items.push(item.clone());
            }
        }

        let last_evaluated_key = match (remaining.peek().is_some(), last_pk) {
            (true, Some(pk)) => self
                .items
                .get(pk)
                .map(|item| cursor_item(&[&self.definition.key], item)),
            _ => None,
        };
        Ok(Page {
            items,
            last_evaluated_key,
        })
    }
}

fn check_type(element: &KeyElement, value: &AttributeValue) -> Result<(), TableError> {
    if value.scalar_type() != element.scalar {
        return Err(TableError::Validation(format!(
            "condition on {} must be of type {:?}",
            element.attribute, element.scalar
        )));
    }
    Ok(())
}

#[async_trait]
impl TableService for MemoryTable {
    async fn describe_table(&self, table: &str) -> Result<TableDescription, TableError> {
        let state = self
            .tables
            .get(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_string()))?;
        Ok(TableDescription {
            definition: state.definition.clone(),
            status: self.status_of(&state),
            item_count: state.items.len() as u64,
        })
    }

    async fn create_table(&self, definition: TableDefinition) -> Result<(), TableError> {
        if definition.name.is_empty() {
            return Err(TableError::Validation("table name must not be empty".to_string()));
        }
        let mut names = BTreeSet::new();
        for ix in &definition.indexes {
            if ix.name.is_empty() || !names.insert(ix.name.as_str()) {
                return Err(TableError::Validation(format!(
                    "invalid or duplicate index name {:?}",
                    ix.name
                )));
            }
        }
        let entry = match self.tables.entry(definition.name.clone()) {
            Entry::Occupied(_) => return Err(TableError::TableExists(definition.name)),
            Entry::Vacant(entry) => entry,
        };

        let indexes = definition
            .indexes
            .iter()
            .map(|ix| IndexState {
                definition: ix.clone(),
                partitions: BTreeMap::new(),
            })
            .collect();
        entry.insert(TableState {
            definition,
            created: Instant::now(),
            items: BTreeMap::new(),
            indexes,
        });
        Ok(())
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), TableError> {
        self.take_injected_failure()?;
        let mut state = self
            .tables
            .get_mut(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_string()))?;
        self.ensure_active(table, &state)?;
        state.put(item)
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>, TableError> {
        self.take_injected_failure()?;
        let state = self
            .tables
            .get(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_string()))?;
        self.ensure_active(table, &state)?;
        let pk = primary_key(&state.definition.key, &key)?;
        Ok(state.items.get(&pk).cloned())
    }

    async fn query(&self, request: QueryRequest) -> Result<Page, TableError> {
        self.take_injected_failure()?;
        let state = self
            .tables
            .get(&request.table)
            .ok_or_else(|| TableError::TableNotFound(request.table.clone()))?;
        self.ensure_active(&request.table, &state)?;
        state.query(&request)
    }

    async fn scan(&self, request: ScanRequest) -> Result<Page, TableError> {
        self.take_injected_failure()?;
        let state = self
            .tables
            .get(&request.table)
            .ok_or_else(|| TableError::TableNotFound(request.table.clone()))?;
        self.ensure_active(&request.table, &state)?;
        state.scan(&request)
    }
}
