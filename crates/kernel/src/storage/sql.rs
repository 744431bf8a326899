//! SQL rendering using SeaQuery.
//!
//! Turns statements into PostgreSQL text with inlined values:
//! - relation-scoped predicates become `EXISTS` subqueries
//! - comparisons against NULL become `IS NULL` / `IS NOT NULL`
//! - text matches become escaped `LIKE` patterns
//! - counts wrap the select in a subquery

use sea_query::{
    Alias, Asterisk, Cond, DeleteStatement, Expr, InsertStatement, Order, PostgresQueryBuilder,
    Query, SelectStatement, SimpleExpr, UpdateStatement,
};

use crate::error::{Error, Result};
use crate::query::entity::{ColumnType, EntityMeta};
use crate::query::expression::{Comparison, Predicate, TextMatch};
use crate::query::resolver::ResolvedField;
use crate::query::statement::{Delete, Insert, Select, Update};
use crate::query::types::SortType;
use crate::query::value::Value;

/// Alias of the subquery wrapped by counts.
const COUNT_ALIAS: &str = "counted";

/// Build the SELECT statement.
pub fn select_statement(select: &Select) -> SelectStatement {
    let table = select.entity.table;
    let mut query = Query::select();

    match &select.columns {
        Some(columns) => {
            for column in columns {
                query.column((Alias::new(table), Alias::new(*column)));
            }
        }
        None => {
            query.column((Alias::new(table), Asterisk));
        }
    }

    query.from(Alias::new(table));

    if select.distinct {
        query.distinct();
    }

    if let Some(predicate) = &select.filter {
        query.and_where(condition(select.entity, predicate));
    }

    if let Some((column, sort_type)) = select.order_by {
        let order = match sort_type {
            SortType::Asc => Order::Asc,
            SortType::Desc => Order::Desc,
        };
        query.order_by((Alias::new(table), Alias::new(column.name)), order);
    }

    if let Some(limit) = select.limit {
        query.limit(limit);
    }
    if let Some(offset) = select.offset {
        query.offset(offset);
    }

    query
}

pub fn render_select(select: &Select) -> String {
    select_statement(select).to_string(PostgresQueryBuilder)
}

/// `SELECT COUNT(*)` over the select as a subquery.
pub fn render_count(select: &Select) -> String {
    let mut inner = select.clone();
    inner.order_by = None;
    Query::select()
        .expr(Expr::col(Asterisk).count())
        .from_subquery(select_statement(&inner), Alias::new(COUNT_ALIAS))
        .to_string(PostgresQueryBuilder)
}

pub fn insert_statement(insert: &Insert) -> Result<InsertStatement> {
    let (columns, values): (Vec<_>, Vec<_>) = insert
        .record
        .iter()
        .map(|(name, value)| (Alias::new(name), SimpleExpr::from(to_sea_value(value))))
        .unzip();

    let mut query = Query::insert();
    query
        .into_table(Alias::new(insert.entity.table))
        .columns(columns)
        .values(values)
        .map_err(|e| Error::Storage(format!("invalid insert: {e}")))?;
    query.returning_all();
    Ok(query)
}

pub fn render_insert(insert: &Insert) -> Result<String> {
    insert_statement(insert).map(|q| q.to_string(PostgresQueryBuilder))
}

pub fn update_statement(update: &Update) -> UpdateStatement {
    let values = update
        .values
        .iter()
        .map(|(name, value)| (Alias::new(name), SimpleExpr::from(to_sea_value(value))));

    let mut query = Query::update();
    query.table(Alias::new(update.entity.table)).values(values);
    if let Some(predicate) = &update.filter {
        query.and_where(condition(update.entity, predicate));
    }
    query.returning_all();
    query
}

pub fn render_update(update: &Update) -> String {
    update_statement(update).to_string(PostgresQueryBuilder)
}

pub fn delete_statement(delete: &Delete) -> DeleteStatement {
    let mut query = Query::delete();
    query.from_table(Alias::new(delete.entity.table));
    if let Some(predicate) = &delete.filter {
        query.and_where(condition(delete.entity, predicate));
    }
    query.returning_all();
    query
}

pub fn render_delete(delete: &Delete) -> String {
    delete_statement(delete).to_string(PostgresQueryBuilder)
}

/// Build the boolean expression for `predicate` over rows of `root`.
pub fn condition(root: &EntityMeta, predicate: &Predicate) -> SimpleExpr {
    match predicate {
        Predicate::Compare { field, op, value } => scoped(root, field, compare(field, *op, value)),
        Predicate::In { field, values } => {
            let values: Vec<sea_query::Value> = values.iter().map(to_sea_value).collect();
            scoped(root, field, column(field).is_in(values))
        }
        Predicate::Text {
            field,
            kind,
            pattern,
        } => scoped(root, field, like(field, *kind, pattern)),
        Predicate::Not(inner) => Cond::all().add(condition(root, inner)).not().into(),
        Predicate::All(predicates) => predicates
            .iter()
            .fold(Cond::all(), |cond, p| cond.add(condition(root, p)))
            .into(),
        Predicate::Any(predicates) => predicates
            .iter()
            .fold(Cond::any(), |cond, p| cond.add(condition(root, p)))
            .into(),
    }
}

/// Column reference: the root table, or the relation alias inside EXISTS.
fn column(field: &ResolvedField) -> Expr {
    let table = field
        .relation
        .map_or(field.entity.table, |relation| relation.name);
    Expr::col((Alias::new(table), Alias::new(field.column.name)))
}

/// `LIKE` against the column, cast to text unless it already is.
fn like(field: &ResolvedField, kind: TextMatch, pattern: &str) -> SimpleExpr {
    let pattern = kind.like_pattern(pattern);
    match field.column.kind {
        ColumnType::Text => column(field).like(pattern),
        _ => column(field).cast_as(Alias::new("TEXT")).like(pattern),
    }
}

/// Wrap a relation-scoped leaf into `EXISTS (SELECT 1 FROM target ...)`.
fn scoped(root: &EntityMeta, field: &ResolvedField, leaf: SimpleExpr) -> SimpleExpr {
    let Some(relation) = field.relation else {
        return leaf;
    };
    let mut subquery = Query::select();
    subquery
        .expr(Expr::val(1))
        .from_as(Alias::new(field.entity.table), Alias::new(relation.name))
        .and_where(
            Expr::col((Alias::new(relation.name), Alias::new(relation.remote_column)))
                .equals((Alias::new(root.table), Alias::new(relation.local_column))),
        )
        .and_where(leaf);
    Expr::exists(subquery)
}

fn compare(field: &ResolvedField, op: Comparison, value: &Value) -> SimpleExpr {
    let col = column(field);
    if value.is_null() {
        match op {
            Comparison::Eq => return col.is_null(),
            Comparison::Ne => return col.is_not_null(),
            _ => {}
        }
    }
    let value = to_sea_value(value);
    match op {
        Comparison::Eq => col.eq(value),
        Comparison::Ne => col.ne(value),
        Comparison::Gt => col.gt(value),
        Comparison::Gte => col.gte(value),
        Comparison::Lt => col.lt(value),
        Comparison::Lte => col.lte(value),
    }
}

/// Convert to a SeaQuery value. Lists and maps are sent as JSON.
pub fn to_sea_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Null => sea_query::Value::from(None::<String>),
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(x) => (*x).into(),
        Value::String(s) => s.clone().into(),
        Value::Uuid(u) => (*u).into(),
        Value::DateTime(dt) => (*dt).into(),
        Value::List(_) | Value::Map(_) => serde_json::Value::from(value.clone()).into(),
    }
}
