//! PostgreSQL storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Storage, sql};
use crate::error::{Error, Result};
use crate::query::entity::{ColumnType, EntityMeta};
use crate::query::statement::{Delete, Insert, Select, Update};
use crate::query::value::{Record, Value};
use crate::session::Session;

/// Storage executing statements on one connection pool.
///
/// Statements run on the open transaction when there is one, otherwise
/// directly on the pool.
pub struct PgStorage {
    pool: PgPool,
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<PgRow>> {
        debug!(sql = %sql, "executing statement");
        let mut tx = self.tx.lock().await;
        let rows = match tx.as_mut() {
            Some(tx) => sqlx::query(sql).fetch_all(&mut **tx).await,
            None => sqlx::query(sql).fetch_all(&self.pool).await,
        };
        rows.map_err(Error::from_database)
    }

    async fn fetch_records(&self, entity: &EntityMeta, sql: &str) -> Result<Vec<Record>> {
        self.fetch(sql)
            .await?
            .iter()
            .map(|row| decode_row(entity, row))
            .collect()
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Record>> {
        self.fetch_records(select.entity, &sql::render_select(select))
            .await
    }

    async fn count(&self, select: &Select) -> Result<u64> {
        let sql = sql::render_count(select);
        debug!(sql = %sql, "executing count");
        let mut tx = self.tx.lock().await;
        let count: i64 = match tx.as_mut() {
            Some(tx) => sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut **tx).await,
            None => sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await,
        }?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, insert: &Insert) -> Result<Record> {
        let sql = sql::render_insert(insert)?;
        self.fetch_records(insert.entity, &sql)
            .await?
            .pop()
            .ok_or_else(|| {
                Error::Storage(format!(
                    "insert into {} returned no row",
                    insert.entity.table
                ))
            })
    }

    async fn update(&self, update: &Update) -> Result<Vec<Record>> {
        self.fetch_records(update.entity, &sql::render_update(update))
            .await
    }

    async fn delete(&self, delete: &Delete) -> Result<Vec<Record>> {
        self.fetch_records(delete.entity, &sql::render_delete(delete))
            .await
    }

    async fn begin(&self) -> Result<()> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(Error::Storage("transaction already open".to_string()));
        }
        *tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(Error::Storage("no open transaction to commit".to_string())),
        }
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => Ok(tx.rollback().await?),
            None => Err(Error::Storage("no open transaction to roll back".to_string())),
        }
    }
}

/// Decode a row using the entity's column types.
fn decode_row(entity: &EntityMeta, row: &PgRow) -> Result<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let name = column.name();
        let kind = entity.column(name).map(|c| c.kind);
        let value: Value = match kind {
            Some(ColumnType::Uuid) => row.try_get::<Option<Uuid>, _>(name)?.into(),
            Some(ColumnType::Integer) => row.try_get::<Option<i64>, _>(name)?.into(),
            Some(ColumnType::Float) => row.try_get::<Option<f64>, _>(name)?.into(),
            Some(ColumnType::Boolean) => row.try_get::<Option<bool>, _>(name)?.into(),
            Some(ColumnType::DateTime) => row.try_get::<Option<DateTime<Utc>>, _>(name)?.into(),
            Some(ColumnType::Json) => row
                .try_get::<Option<serde_json::Value>, _>(name)?
                .map_or(Value::Null, Value::from),
            Some(ColumnType::Text) | None => row.try_get::<Option<String>, _>(name)?.into(),
        };
        record.insert(name, value);
    }
    Ok(record)
}

/// Creates one [`Session`] per unit of work from the writer and reader
/// pools.
#[derive(Clone)]
pub struct PgSessionFactory {
    writer: PgPool,
    reader: PgPool,
}

impl PgSessionFactory {
    pub fn new(writer: PgPool, reader: PgPool) -> Self {
        Self { writer, reader }
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::new(Session::new(
            Arc::new(PgStorage::new(self.writer.clone())),
            Arc::new(PgStorage::new(self.reader.clone())),
        ))
    }
}
