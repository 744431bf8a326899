//! Statements built by the composer and executed by a storage backend.

use std::collections::BTreeMap;

use super::entity::{ColumnMeta, EntityMeta, RelationMeta};
use super::expression::Predicate;
use super::types::SortType;
use super::value::Record;

/// Kind of statement, used for reader/writer routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_write(self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

/// A SELECT over one entity.
#[derive(Debug, Clone)]
pub struct Select {
    pub entity: &'static EntityMeta,
    /// Relations loaded alongside each row.
    pub include: Vec<&'static RelationMeta>,
    /// Root columns returned. `None` returns every column.
    pub columns: Option<Vec<&'static str>>,
    /// Columns returned for included relations, keyed by relation name.
    pub related_columns: BTreeMap<&'static str, Vec<&'static str>>,
    pub filter: Option<Predicate>,
    pub order_by: Option<(&'static ColumnMeta, SortType)>,
    /// Return distinct values of the single projected column.
    pub distinct: bool,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Select {
    /// Every row and column of `entity`.
    pub fn all(entity: &'static EntityMeta) -> Self {
        Self {
            entity,
            include: Vec::new(),
            columns: None,
            related_columns: BTreeMap::new(),
            filter: None,
            order_by: None,
            distinct: false,
            offset: None,
            limit: None,
        }
    }

    /// Distinct values of one column, ordered by that column.
    pub fn distinct_column(mut self, column: &'static ColumnMeta, sort_type: SortType) -> Self {
        self.include.clear();
        self.related_columns.clear();
        self.columns = Some(vec![column.name]);
        self.order_by = Some((column, sort_type));
        self.distinct = true;
        self.offset = None;
        self.limit = None;
        self
    }

    /// Columns the storage should return for a row of `entity`.
    pub fn returns(&self, column: &str) -> bool {
        self.columns
            .as_ref()
            .is_none_or(|columns| columns.contains(&column))
    }

    pub fn kind(&self) -> StatementKind {
        StatementKind::Select
    }
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub entity: &'static EntityMeta,
    pub record: Record,
}

/// Bulk update of the rows matching `filter`.
#[derive(Debug, Clone)]
pub struct Update {
    pub entity: &'static EntityMeta,
    pub filter: Option<Predicate>,
    pub values: Record,
}

/// Bulk delete of the rows matching `filter`.
#[derive(Debug, Clone)]
pub struct Delete {
    pub entity: &'static EntityMeta,
    pub filter: Option<Predicate>,
}
