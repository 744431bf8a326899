//! Predicate construction from `{field, value, operator}` conditions.

use super::entity::{ColumnType, datetime_text};
use super::resolver::{FieldResolver, ResolvedField};
use super::types::{Combinator, FilterParam, FilterRequest, OperatorType};
use super::value::Value;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    StartsWith,
    EndsWith,
    Contains,
}

impl TextMatch {
    /// LIKE pattern for `needle`, with wildcards in the needle escaped.
    pub fn like_pattern(self, needle: &str) -> String {
        let escaped = escape_like_wildcards(needle);
        match self {
            TextMatch::StartsWith => format!("{escaped}%"),
            TextMatch::EndsWith => format!("%{escaped}"),
            TextMatch::Contains => format!("%{escaped}%"),
        }
    }

    pub fn matches(self, haystack: &str, needle: &str) -> bool {
        match self {
            TextMatch::StartsWith => haystack.starts_with(needle),
            TextMatch::EndsWith => haystack.ends_with(needle),
            TextMatch::Contains => haystack.contains(needle),
        }
    }
}

/// Escape LIKE wildcard characters (`%`, `_`, `\`).
pub fn escape_like_wildcards(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Boolean predicate over the rows of one entity.
///
/// A leaf whose field crosses a relation holds when at least one related
/// row satisfies it.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        field: ResolvedField,
        op: Comparison,
        value: Value,
    },
    In {
        field: ResolvedField,
        values: Vec<Value>,
    },
    Text {
        field: ResolvedField,
        kind: TextMatch,
        pattern: String,
    },
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// `field IN values` against a root column.
    pub fn is_in(field: ResolvedField, values: Vec<Value>) -> Self {
        Predicate::In { field, values }
    }

    /// `field = value` against a root column.
    pub fn equals(field: ResolvedField, value: Value) -> Self {
        Predicate::Compare {
            field,
            op: Comparison::Eq,
            value,
        }
    }
}

/// Builds predicates for one root entity.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder {
    resolver: FieldResolver,
}

impl ExpressionBuilder {
    pub fn new(resolver: FieldResolver) -> Self {
        Self { resolver }
    }

    pub fn build(&self, field: &str, value: Value, operator: OperatorType) -> Result<Predicate> {
        self.resolver.validate(field)?;

        if operator.is_membership() && !matches!(value, Value::List(_)) {
            return Err(Error::BadRequest(format!(
                "value must be a list for IN/NOT_IN operators, got {} for field {field}",
                value.type_name()
            )));
        }

        let resolved = self.resolver.resolve(field)?;

        let compare = |op: Comparison, value: Value| -> Result<Predicate> {
            Ok(Predicate::Compare {
                field: resolved,
                op,
                value: resolved.column.coerce_filter(field, value)?,
            })
        };
        let text = |kind: TextMatch, value: Value| -> Result<Predicate> {
            let pattern = match (resolved.column.kind, value) {
                (ColumnType::DateTime, value) => {
                    datetime_text(&resolved.column.datetime(field, value)?)
                }
                (ColumnType::Text, Value::String(pattern)) => pattern,
                (ColumnType::Text, other) => {
                    return Err(Error::BadRequest(format!(
                        "operator {operator} expects a string value for field {field}, got {}",
                        other.type_name()
                    )));
                }
                (other, _) => {
                    return Err(Error::BadRequest(format!(
                        "operator {operator} is not supported for field {field} of type {other:?}"
                    )));
                }
            };
            Ok(Predicate::Text {
                field: resolved,
                kind,
                pattern,
            })
        };
        let membership = |value: Value| -> Result<Predicate> {
            let Value::List(items) = value else {
                return Err(Error::BadRequest(format!(
                    "value must be a list for IN/NOT_IN operators for field {field}"
                )));
            };
            let values = items
                .into_iter()
                .map(|item| resolved.column.coerce(field, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Predicate::In {
                field: resolved,
                values,
            })
        };

        match operator {
            OperatorType::Equals => compare(Comparison::Eq, value),
            // a related row that differs does not exclude one that matches
            OperatorType::NotEqual if resolved.relation.is_some() => {
                compare(Comparison::Eq, value).map(Predicate::negate)
            }
            OperatorType::NotEqual => compare(Comparison::Ne, value),
            OperatorType::Greater => compare(Comparison::Gt, value),
            OperatorType::EqualsOrGreater => compare(Comparison::Gte, value),
            OperatorType::Less => compare(Comparison::Lt, value),
            OperatorType::EqualsOrLess => compare(Comparison::Lte, value),
            OperatorType::In => membership(value),
            OperatorType::NotIn => membership(value).map(Predicate::negate),
            OperatorType::StartsWith => text(TextMatch::StartsWith, value),
            OperatorType::NotStartWith => text(TextMatch::StartsWith, value).map(Predicate::negate),
            OperatorType::EndsWith => text(TextMatch::EndsWith, value),
            OperatorType::NotEndWith => text(TextMatch::EndsWith, value).map(Predicate::negate),
            OperatorType::Contains => text(TextMatch::Contains, value),
            OperatorType::NotContain => text(TextMatch::Contains, value).map(Predicate::negate),
            OperatorType::ElemMatch => Err(Error::BadRequest(format!(
                "operator {operator} is not supported"
            ))),
        }
    }

    pub fn build_param(&self, param: &FilterParam) -> Result<Predicate> {
        self.build(&param.field, param.value.clone(), param.operator)
    }

    /// Combine every condition of `request`. `None` when it has none.
    pub fn build_request(&self, request: &FilterRequest) -> Result<Option<Predicate>> {
        if request.is_empty() {
            return Ok(None);
        }
        let predicates = request
            .filters
            .iter()
            .map(|param| self.build_param(param))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(match request.combinator {
            Combinator::And => Predicate::All(predicates),
            Combinator::Or => Predicate::Any(predicates),
        }))
    }
}
