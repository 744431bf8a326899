//! In-process storage backend.
//!
//! Tables are plain vectors of records guarded by one lock. Predicates are
//! evaluated with SQL three-valued logic so results match the PostgreSQL
//! backend, including NULL handling.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Storage;
use crate::error::{Error, Result};
use crate::query::entity::{EntityMeta, datetime_text};
use crate::query::expression::{Comparison, Predicate};
use crate::query::resolver::ResolvedField;
use crate::query::statement::{Delete, Insert, Select, Update};
use crate::query::types::SortType;
use crate::query::value::{Record, Value};

type Tables = BTreeMap<&'static str, Vec<Record>>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    /// Tables as of `begin`, restored on rollback.
    snapshot: Option<Tables>,
}

/// Storage kept in process memory. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    executed: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `entity`'s table, bypassing constraints.
    pub fn seed(&self, entity: &'static EntityMeta, rows: impl IntoIterator<Item = Record>) {
        self.state
            .write()
            .tables
            .entry(entity.table)
            .or_default()
            .extend(rows);
    }

    /// Current rows of `entity`'s table.
    pub fn rows(&self, entity: &EntityMeta) -> Vec<Record> {
        self.state
            .read()
            .tables
            .get(entity.table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of statements executed so far.
    pub fn statements_executed(&self) -> usize {
        self.executed.load(AtomicOrdering::SeqCst)
    }

    pub fn in_transaction(&self) -> bool {
        self.state.read().snapshot.is_some()
    }

    fn record_execution(&self) {
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn select_rows(&self, select: &Select) -> Vec<Record> {
        let state = self.state.read();
        let empty = Vec::new();
        let table = state.tables.get(select.entity.table).unwrap_or(&empty);

        let mut rows: Vec<Record> = table
            .iter()
            .filter(|row| matches_filter(select.filter.as_ref(), row, &state.tables))
            .cloned()
            .collect();

        if let Some((column, sort_type)) = select.order_by {
            rows.sort_by(|a, b| {
                let (x, y) = (field(a, column.name), field(b, column.name));
                match sort_type {
                    SortType::Asc => x.sort_cmp(y),
                    SortType::Desc => y.sort_cmp(x),
                }
            });
        }

        if let Some(columns) = &select.columns {
            for row in &mut rows {
                row.retain_keys(columns);
            }
        }

        if select.distinct {
            let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        let offset = select.offset.unwrap_or(0) as usize;
        let limit = select.limit.map_or(usize::MAX, |l| l as usize);
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Record>> {
        self.record_execution();
        Ok(self.select_rows(select))
    }

    async fn count(&self, select: &Select) -> Result<u64> {
        self.record_execution();
        Ok(self.select_rows(select).len() as u64)
    }

    async fn insert(&self, insert: &Insert) -> Result<Record> {
        self.record_execution();
        let mut state = self.state.write();
        let mut table = state
            .tables
            .get(insert.entity.table)
            .cloned()
            .unwrap_or_default();
        table.push(insert.record.clone());
        check_unique(insert.entity, &table)?;
        state.tables.insert(insert.entity.table, table);
        Ok(insert.record.clone())
    }

    async fn update(&self, update: &Update) -> Result<Vec<Record>> {
        self.record_execution();
        let mut state = self.state.write();
        let Some(current) = state.tables.get(update.entity.table) else {
            return Ok(Vec::new());
        };

        let mut table = current.clone();
        let mut updated = Vec::new();
        for row in &mut table {
            if matches_filter(update.filter.as_ref(), row, &state.tables) {
                for (name, value) in update.values.iter() {
                    row.insert(name, value.clone());
                }
                updated.push(row.clone());
            }
        }
        check_unique(update.entity, &table)?;
        state.tables.insert(update.entity.table, table);
        Ok(updated)
    }

    async fn delete(&self, delete: &Delete) -> Result<Vec<Record>> {
        self.record_execution();
        let mut state = self.state.write();
        let Some(current) = state.tables.get(delete.entity.table) else {
            return Ok(Vec::new());
        };

        let (removed, kept): (Vec<Record>, Vec<Record>) = current
            .iter()
            .cloned()
            .partition(|row| matches_filter(delete.filter.as_ref(), row, &state.tables));
        state.tables.insert(delete.entity.table, kept);
        Ok(removed)
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.snapshot.is_some() {
            return Err(Error::Storage("transaction already open".to_string()));
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.write();
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("no open transaction to commit".to_string()))
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.write();
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| Error::Storage("no open transaction to roll back".to_string()))?;
        state.tables = snapshot;
        Ok(())
    }
}

fn field<'a>(row: &'a Record, name: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    row.get(name).unwrap_or(NULL)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a.partial_cmp(b) == Some(Ordering::Equal) || a == b
}

/// Reject a table holding two equal non-null values in a unique column
/// or the primary key.
fn check_unique(entity: &EntityMeta, table: &[Record]) -> Result<()> {
    let columns = entity
        .columns
        .iter()
        .filter(|c| c.unique || c.name == entity.primary_key);
    for column in columns {
        let mut seen: Vec<&Value> = Vec::with_capacity(table.len());
        for row in table {
            let value = field(row, column.name);
            if value.is_null() {
                continue;
            }
            if seen.iter().any(|v| values_equal(v, value)) {
                return Err(Error::Duplicate(format!(
                    "{}.{} = {value} already exists",
                    entity.table, column.name
                )));
            }
            seen.push(value);
        }
    }
    Ok(())
}

fn matches_filter(filter: Option<&Predicate>, row: &Record, tables: &Tables) -> bool {
    filter.is_none_or(|predicate| eval(predicate, row, tables) == Some(true))
}

/// Evaluate `predicate` for `row`. `None` is SQL's UNKNOWN.
fn eval(predicate: &Predicate, row: &Record, tables: &Tables) -> Option<bool> {
    match predicate {
        Predicate::Compare { field, op, value } => {
            leaf(field, row, tables, |v| compare(v, *op, value))
        }
        Predicate::In { field, values } => leaf(field, row, tables, |v| {
            if v.is_null() {
                None
            } else {
                Some(values.iter().any(|candidate| values_equal(v, candidate)))
            }
        }),
        Predicate::Text {
            field,
            kind,
            pattern,
        } => leaf(field, row, tables, |v| match v {
            Value::Null => None,
            Value::String(s) => Some(kind.matches(s, pattern)),
            Value::DateTime(dt) => Some(kind.matches(&datetime_text(dt), pattern)),
            other => Some(kind.matches(&other.to_string(), pattern)),
        }),
        Predicate::Not(inner) => eval(inner, row, tables).map(|b| !b),
        Predicate::All(predicates) => {
            let mut result = Some(true);
            for predicate in predicates {
                match eval(predicate, row, tables) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Predicate::Any(predicates) => {
            let mut result = Some(false);
            for predicate in predicates {
                match eval(predicate, row, tables) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
    }
}

/// Evaluate a leaf test on the row, or on its related rows (true when any
/// related row passes).
fn leaf(
    resolved: &ResolvedField,
    row: &Record,
    tables: &Tables,
    test: impl Fn(&Value) -> Option<bool>,
) -> Option<bool> {
    let Some(relation) = resolved.relation else {
        return test(field(row, resolved.column.name));
    };

    let key = field(row, relation.local_column);
    if key.is_null() {
        return Some(false);
    }
    let related = tables.get(resolved.entity.table);
    Some(related.into_iter().flatten().any(|other| {
        values_equal(field(other, relation.remote_column), key)
            && test(field(other, resolved.column.name)) == Some(true)
    }))
}

fn compare(actual: &Value, op: Comparison, expected: &Value) -> Option<bool> {
    if expected.is_null() {
        return match op {
            Comparison::Eq => Some(actual.is_null()),
            Comparison::Ne => Some(!actual.is_null()),
            _ => None,
        };
    }
    if actual.is_null() {
        return None;
    }
    let Some(ordering) = actual.partial_cmp(expected) else {
        return match op {
            Comparison::Eq => Some(actual == expected),
            Comparison::Ne => Some(actual != expected),
            _ => None,
        };
    };
    Some(match op {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Ne => ordering != Ordering::Equal,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Gte => ordering != Ordering::Less,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Lte => ordering != Ordering::Greater,
    })
}
