//! Static entity metadata and the record conversion traits.
//!
//! Each entity type registers one `static` [`EntityMeta`] describing its
//! table, columns and relations. The query engine only ever looks at this
//! metadata; it never reflects over the Rust type itself.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use super::value::{Record, Value};
use crate::error::{Error, Result};

/// Name of the column used for ordering when the caller gives none.
pub const DEFAULT_SORT_COLUMN: &str = "updated_at";

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Json,
}

/// Value generated on insert when the caller supplies none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// A fresh UUIDv7.
    GeneratedUuid,
    /// The current UTC time.
    Now,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnMeta {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    /// Set to the current time on every update.
    pub on_update: bool,
}

impl ColumnMeta {
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
            default: None,
            on_update: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn on_update(mut self) -> Self {
        self.on_update = true;
        self
    }

    /// Coerce a request value to this column's type.
    ///
    /// `field` is the name reported in errors (it may be a dotted path).
    pub fn coerce(&self, field: &str, value: Value) -> Result<Value> {
        match (self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::DateTime, value) => self.datetime(field, value).map(Value::DateTime),
            (ColumnType::Uuid, Value::String(s)) => Uuid::parse_str(&s)
                .map(Value::Uuid)
                .map_err(|_| Error::Field(format!("invalid uuid for field {field}: {s}"))),
            (ColumnType::Uuid, value @ Value::Uuid(_)) => Ok(value),
            (ColumnType::Uuid, other) => Err(Error::Field(format!(
                "invalid type for field {field}: expected uuid, got {}",
                other.type_name()
            ))),
            (_, value) => Ok(value),
        }
    }

    /// Coerce a filter value. Unlike [`coerce`](Self::coerce), a date/time
    /// column accepts only timestamps here, so NULL is rejected.
    pub fn coerce_filter(&self, field: &str, value: Value) -> Result<Value> {
        match self.kind {
            ColumnType::DateTime => self.datetime(field, value).map(Value::DateTime),
            _ => self.coerce(field, value),
        }
    }

    /// Parse an ISO 8601 string for this date/time column.
    pub fn datetime(&self, field: &str, value: Value) -> Result<DateTime<Utc>> {
        match value {
            Value::String(s) => parse_datetime(&s).ok_or_else(|| {
                Error::Field(format!(
                    "invalid datetime format for field {field}, expected ISO 8601"
                ))
            }),
            Value::DateTime(dt) => Ok(dt),
            other => Err(Error::Field(format!(
                "invalid type for field {field}: expected str, got {}",
                other.type_name()
            ))),
        }
    }

    /// Value generated for this column on insert, if any.
    pub fn generate_default(&self, now: DateTime<Utc>) -> Option<Value> {
        self.default.map(|default| match default {
            ColumnDefault::GeneratedUuid => Value::Uuid(Uuid::now_v7()),
            ColumnDefault::Now => Value::DateTime(now),
        })
    }
}

/// Text form of a timestamp as PostgreSQL casts a UTC `timestamptz`:
/// `2024-03-01 12:00:00+00`, with trailing zero microseconds dropped.
pub fn datetime_text(dt: &DateTime<Utc>) -> String {
    let micros = dt.timestamp_subsec_micros();
    let base = dt.format("%Y-%m-%d %H:%M:%S").to_string();
    if micros == 0 {
        return format!("{base}+00");
    }
    let fraction = format!("{micros:06}");
    format!("{base}.{}+00", fraction.trim_end_matches('0'))
}

/// Parse an ISO 8601 timestamp: RFC 3339, a naive date-time (taken as
/// UTC), or a plain date (midnight UTC).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationDirection {
    /// The local column holds the target's key.
    ManyToOne,
    /// The target's column holds the local key.
    OneToMany,
}

/// A one-hop association to another entity.
#[derive(Debug, Clone, Copy)]
pub struct RelationMeta {
    pub name: &'static str,
    pub direction: RelationDirection,
    pub target: fn() -> &'static EntityMeta,
    /// Column on this entity joined on.
    pub local_column: &'static str,
    /// Column on the target joined on.
    pub remote_column: &'static str,
}

impl RelationMeta {
    pub fn target(&self) -> &'static EntityMeta {
        (self.target)()
    }
}

#[derive(Debug)]
pub struct EntityMeta {
    /// Display name used in error messages.
    pub name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [ColumnMeta],
    pub relations: &'static [RelationMeta],
}

impl EntityMeta {
    pub fn column(&self, name: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|c| c.name)
    }

    pub fn primary_key_column(&self) -> Result<&'static ColumnMeta> {
        self.column(self.primary_key).ok_or_else(|| {
            Error::Storage(format!(
                "{} declares primary key {} which is not a column",
                self.name, self.primary_key
            ))
        })
    }

    /// Column ordered on when no explicit sort is requested.
    pub fn default_sort_column(&self) -> Option<&'static ColumnMeta> {
        self.column(DEFAULT_SORT_COLUMN)
    }
}

/// Conversion from a stored record into an output type.
///
/// The type a caller asks for decides the output shape: [`Record`] itself,
/// an entity, or a response DTO.
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self> {
        Ok(record)
    }
}

/// A persisted entity type.
pub trait Entity: FromRecord + Send + Sync + 'static {
    fn meta() -> &'static EntityMeta;

    fn to_record(&self) -> Record;
}

/// Typed extraction of a single record value.
pub trait FromValue: Sized {
    fn from_value(field: &str, value: Value) -> Result<Self>;
}

fn decode_error(field: &str, expected: &str, value: &Value) -> Error {
    Error::Decode(format!(
        "field {field}: expected {expected}, got {}",
        value.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(_field: &str, value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(decode_error(field, "string", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(decode_error(field, "integer", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Float(n) => Ok(n),
            Value::Int(n) => Ok(n as f64),
            other => Err(decode_error(field, "float", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(decode_error(field, "boolean", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Uuid(id) => Ok(id),
            Value::String(s) => {
                Uuid::parse_str(&s).map_err(|e| Error::Decode(format!("field {field}: {e}")))
            }
            other => Err(decode_error(field, "uuid", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::String(s) => parse_datetime(&s)
                .ok_or_else(|| Error::Decode(format!("field {field}: invalid datetime {s}"))),
            other => Err(decode_error(field, "datetime", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(field, other).map(Some),
        }
    }
}

impl Record {
    /// Remove `field` and convert it. A missing key reads as null.
    pub fn take<T: FromValue>(&mut self, field: &str) -> Result<T> {
        let value = self.remove(field).unwrap_or_default();
        T::from_value(field, value)
    }
}
