//! Storage backends.
//!
//! Provides the [`Storage`] trait the session executes statements through,
//! and implementations backed by PostgreSQL or process memory.

mod memory;
mod postgres;
pub mod sql;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::query::statement::{Delete, Insert, Select, Update};
use crate::query::value::Record;

pub use memory::MemoryStorage;
pub use postgres::{PgSessionFactory, PgStorage};

/// Storage backend trait.
///
/// Backends execute statements; they never build or validate them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows matching `select`, without related records.
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Record>>;

    /// The single row matching `select`, if any.
    async fn fetch_optional(&self, select: &Select) -> Result<Option<Record>> {
        let mut rows = self.fetch_all(select).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            _ => Err(Error::MultipleResults(select.entity.name)),
        }
    }

    /// Number of rows `select` would return.
    async fn count(&self, select: &Select) -> Result<u64>;

    /// Insert one row and return it as stored.
    async fn insert(&self, insert: &Insert) -> Result<Record>;

    /// Update matching rows and return them as stored.
    async fn update(&self, update: &Update) -> Result<Vec<Record>>;

    /// Delete matching rows and return them.
    async fn delete(&self, delete: &Delete) -> Result<Vec<Record>>;

    /// Open a transaction.
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;
}
