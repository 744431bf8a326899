//! Request model for repository reads and bulk writes.
//!
//! Provides the value objects a caller builds per request:
//! - FilterRequest / FilterParam: what to match
//! - SortParams: how to order
//! - PaginationParams: which window to return
//! - ListOptions: the bundle passed to list-style reads

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::{Error, Result};

/// Combinator joining the predicates of a [`FilterRequest`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("AND"),
            Combinator::Or => f.write_str("OR"),
        }
    }
}

impl FromStr for Combinator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AND" => Ok(Combinator::And),
            "OR" => Ok(Combinator::Or),
            other => Err(Error::BadRequest(format!(
                "filter type {other} is not supported"
            ))),
        }
    }
}

/// Comparison operators for filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorType {
    /// Exact match.
    Equals,
    /// Not equal.
    NotEqual,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    /// Greater than.
    Greater,
    /// Greater than or equal.
    EqualsOrGreater,
    /// Less than.
    Less,
    /// Less than or equal.
    EqualsOrLess,
    /// Prefix match.
    StartsWith,
    /// Negated prefix match.
    NotStartWith,
    /// Suffix match.
    EndsWith,
    /// Negated suffix match.
    NotEndWith,
    /// Substring match.
    Contains,
    /// Negated substring match.
    NotContain,
    /// Array element match. Declared for wire compatibility; not supported.
    ElemMatch,
}

impl OperatorType {
    pub const ALL: [OperatorType; 15] = [
        OperatorType::Equals,
        OperatorType::NotEqual,
        OperatorType::In,
        OperatorType::NotIn,
        OperatorType::Greater,
        OperatorType::EqualsOrGreater,
        OperatorType::Less,
        OperatorType::EqualsOrLess,
        OperatorType::StartsWith,
        OperatorType::NotStartWith,
        OperatorType::EndsWith,
        OperatorType::NotEndWith,
        OperatorType::Contains,
        OperatorType::NotContain,
        OperatorType::ElemMatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorType::Equals => "EQUALS",
            OperatorType::NotEqual => "NOT_EQUAL",
            OperatorType::In => "IN",
            OperatorType::NotIn => "NOT_IN",
            OperatorType::Greater => "GREATER",
            OperatorType::EqualsOrGreater => "EQUALS_OR_GREATER",
            OperatorType::Less => "LESS",
            OperatorType::EqualsOrLess => "EQUALS_OR_LESS",
            OperatorType::StartsWith => "STARTS_WITH",
            OperatorType::NotStartWith => "NOT_START_WITH",
            OperatorType::EndsWith => "ENDS_WITH",
            OperatorType::NotEndWith => "NOT_END_WITH",
            OperatorType::Contains => "CONTAINS",
            OperatorType::NotContain => "NOT_CONTAIN",
            OperatorType::ElemMatch => "ELEM_MATCH",
        }
    }

    /// Whether the operator takes a list value.
    pub fn is_membership(self) -> bool {
        matches!(self, OperatorType::In | OperatorType::NotIn)
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OperatorType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::BadRequest(format!("operator {s} is not supported")))
    }
}

/// A single `{field, value, operator}` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParam {
    /// Column name, or `relation.column` for one relation hop.
    pub field: String,
    pub value: Value,
    pub operator: OperatorType,
}

impl FilterParam {
    pub fn new(field: impl Into<String>, value: impl Into<Value>, operator: OperatorType) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
        }
    }

    /// Shorthand for an `EQUALS` condition.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, OperatorType::Equals)
    }
}

impl fmt::Display for FilterParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field='{}' value={} operator={}",
            self.field, self.value, self.operator
        )
    }
}

/// Ordered list of conditions joined by one combinator.
///
/// An empty filter list places no constraint on the query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub filters: Vec<FilterParam>,

    #[serde(default, rename = "type")]
    pub combinator: Combinator,
}

impl FilterRequest {
    pub fn new(filters: Vec<FilterParam>, combinator: Combinator) -> Self {
        Self {
            filters,
            combinator,
        }
    }

    /// All conditions must hold.
    pub fn all(filters: Vec<FilterParam>) -> Self {
        Self::new(filters, Combinator::And)
    }

    /// Any condition may hold.
    pub fn any(filters: Vec<FilterParam>) -> Self {
        Self::new(filters, Combinator::Or)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Display for FilterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters = if self.filters.is_empty() {
            "None".to_string()
        } else {
            self.filters
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        write!(
            f,
            "FilterRequest(filters=[{filters}], type={})",
            self.combinator
        )
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortType::Asc),
            "desc" => Ok(SortType::Desc),
            other => Err(Error::BadRequest(format!(
                "sort type {other} is not supported"
            ))),
        }
    }
}

/// Sort specification. Without `sort_by` the entity's last-modified
/// timestamp is used when it has one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortParams {
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_type: SortType,
}

impl SortParams {
    pub fn new(sort_by: Option<String>, sort_type: SortType) -> Self {
        Self { sort_by, sort_type }
    }

    pub fn by(field: impl Into<String>, sort_type: SortType) -> Self {
        Self::new(Some(field.into()), sort_type)
    }
}

/// Offset/limit window. `limit == -1` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Sentinel limit for "no limit".
pub const UNBOUNDED: i64 = -1;

fn default_limit() -> i64 {
    100
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    /// Validated constructor.
    pub fn new(skip: i64, limit: i64) -> Result<Self> {
        if skip < 0 {
            return Err(Error::BadRequest(format!(
                "skip must be >= 0, got {skip}"
            )));
        }
        if limit < UNBOUNDED {
            return Err(Error::BadRequest(format!(
                "limit must be >= -1, got {limit}"
            )));
        }
        Ok(Self { skip, limit })
    }

    /// Every row, no offset.
    pub fn unbounded() -> Self {
        Self {
            skip: 0,
            limit: UNBOUNDED,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit <= UNBOUNDED
    }

    /// 1-based page number of this window.
    pub fn page(&self) -> i64 {
        if self.limit > 0 {
            self.skip / self.limit + 1
        } else {
            1
        }
    }

    /// Number of pages needed for `total_count` rows.
    pub fn total_pages(&self, total_count: u64) -> u64 {
        if self.limit > 0 {
            total_count.div_ceil(self.limit as u64)
        } else {
            1
        }
    }
}

/// Options shared by list-style reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub pagination: PaginationParams,
    pub sort: SortParams,
    /// Columns to return (`relation.column` allowed). `None` returns all.
    pub projection: Option<Vec<String>>,
    /// Relations to load alongside each record.
    pub with_related: Vec<String>,
}

impl ListOptions {
    pub fn paginate(mut self, pagination: PaginationParams) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn sort(mut self, sort: SortParams) -> Self {
        self.sort = sort;
        self
    }

    pub fn project<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_related<S: Into<String>>(mut self, relations: impl IntoIterator<Item = S>) -> Self {
        self.with_related = relations.into_iter().map(Into::into).collect();
        self
    }
}

/// Parse a comma separated projection (`"id,email"`).
pub fn parse_projection(raw: Option<&str>) -> Option<Vec<String>> {
    let fields: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    (!fields.is_empty()).then_some(fields)
}
