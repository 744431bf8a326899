//! Per-unit-of-work database session.
//!
//! A session owns a writer and a reader storage. Writes, and any read made
//! after a write in the open transaction, go to the writer; other reads go
//! to the reader. The session is passed explicitly down the call chain and never
//! shared between units of work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::error::Result;
use crate::query::entity::RelationDirection;
use crate::query::expression::Predicate;
use crate::query::resolver::ResolvedField;
use crate::query::statement::{Delete, Insert, Select, StatementKind, Update};
use crate::query::types::SortType;
use crate::query::value::{Record, Value};
use crate::storage::Storage;

pub struct Session {
    writer: Arc<dyn Storage>,
    reader: Arc<dyn Storage>,
    /// A write happened inside the open transaction.
    pending: AtomicBool,
    in_transaction: AtomicBool,
}

impl Session {
    pub fn new(writer: Arc<dyn Storage>, reader: Arc<dyn Storage>) -> Self {
        Self {
            writer,
            reader,
            pending: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Session reading and writing through the same storage.
    pub fn single(storage: Arc<dyn Storage>) -> Self {
        Self::new(storage.clone(), storage)
    }

    /// Storage a statement of `kind` executes on.
    pub fn route(&self, kind: StatementKind) -> &dyn Storage {
        if kind.is_write() || self.pending.load(Ordering::SeqCst) {
            debug!(?kind, "routing statement to writer");
            self.writer.as_ref()
        } else {
            debug!(?kind, "routing statement to reader");
            self.reader.as_ref()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    pub async fn begin(&self) -> Result<()> {
        self.writer.begin().await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        debug!("transaction started");
        Ok(())
    }

    /// Begin a transaction unless one is already open. Returns whether
    /// this call opened it.
    pub async fn begin_if_idle(&self) -> Result<bool> {
        if self.in_transaction() {
            return Ok(false);
        }
        self.begin().await?;
        Ok(true)
    }

    pub async fn commit(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        self.writer.commit().await?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        self.writer.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Commit when `result` is `Ok`, roll back otherwise, and hand the
    /// result back.
    pub async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Rows matching `select`, with included relations attached.
    pub async fn fetch_all(&self, select: &Select) -> Result<Vec<Record>> {
        let storage = self.route(select.kind());
        let mut rows = storage.fetch_all(select).await?;
        load_related(storage, select, &mut rows).await?;
        Ok(rows)
    }

    /// The single row matching `select`, with included relations attached.
    pub async fn fetch_optional(&self, select: &Select) -> Result<Option<Record>> {
        let storage = self.route(select.kind());
        let Some(row) = storage.fetch_optional(select).await? else {
            return Ok(None);
        };
        let mut rows = [row];
        load_related(storage, select, &mut rows).await?;
        let [row] = rows;
        Ok(Some(row))
    }

    pub async fn count(&self, select: &Select) -> Result<u64> {
        self.route(select.kind()).count(select).await
    }

    /// Pin reads to the writer until the transaction ends. Outside a
    /// transaction the write is already committed.
    fn mark_written(&self) {
        if self.in_transaction() {
            self.pending.store(true, Ordering::SeqCst);
        }
    }

    pub async fn insert(&self, insert: &Insert) -> Result<Record> {
        let record = self.route(StatementKind::Insert).insert(insert).await?;
        self.mark_written();
        Ok(record)
    }

    pub async fn update(&self, update: &Update) -> Result<Vec<Record>> {
        let records = self.route(StatementKind::Update).update(update).await?;
        self.mark_written();
        Ok(records)
    }

    pub async fn delete(&self, delete: &Delete) -> Result<Vec<Record>> {
        let records = self.route(StatementKind::Delete).delete(delete).await?;
        self.mark_written();
        Ok(records)
    }
}

/// Attach each included relation to `rows`, one `IN` query per relation.
///
/// Many-to-one relations attach a map (or null), one-to-many a list.
async fn load_related(storage: &dyn Storage, select: &Select, rows: &mut [Record]) -> Result<()> {
    for relation in &select.include {
        let target = relation.target();

        let mut keys: Vec<Value> = Vec::new();
        for row in rows.iter() {
            if let Some(key) = row.get(relation.local_column)
                && !key.is_null()
                && !keys.contains(key)
            {
                keys.push(key.clone());
            }
        }

        let related = if keys.is_empty() {
            Vec::new()
        } else {
            let remote = ResolvedField::root(target, relation.remote_column)?;
            let mut query = Select::all(target);
            query.filter = Some(Predicate::is_in(remote, keys));
            query.columns = select.related_columns.get(relation.name).cloned();
            query.order_by = target
                .default_sort_column()
                .map(|column| (column, SortType::Asc));
            storage.fetch_all(&query).await?
        };

        for row in rows.iter_mut() {
            let key = row.get(relation.local_column).cloned().unwrap_or_default();
            let mut matching = related
                .iter()
                .filter(|other| !key.is_null() && other.get(relation.remote_column) == Some(&key))
                .cloned()
                .map(Value::from);
            let value = match relation.direction {
                RelationDirection::ManyToOne => matching.next().unwrap_or_default(),
                RelationDirection::OneToMany => Value::List(matching.collect()),
            };
            row.insert(relation.name, value);
        }
    }
    Ok(())
}
