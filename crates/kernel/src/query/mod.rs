//! Generic filter and query-building engine.
//!
//! Translates declarative filter, sort, pagination and projection requests
//! into statements against any entity described by static metadata.

pub mod composer;
pub mod entity;
pub mod expression;
pub mod facets;
pub mod resolver;
pub mod statement;
pub mod types;
pub mod value;

pub use composer::QueryComposer;
pub use entity::{
    ColumnDefault, ColumnMeta, ColumnType, Entity, EntityMeta, FromRecord, FromValue,
    RelationDirection, RelationMeta,
};
pub use expression::{ExpressionBuilder, Predicate};
pub use facets::{FacetMap, unique_values};
pub use resolver::{FieldResolver, ResolvedField};
pub use statement::{Delete, Insert, Select, StatementKind, Update};
pub use types::{
    Combinator, FilterParam, FilterRequest, ListOptions, OperatorType, PaginationParams,
    SortParams, SortType, parse_projection,
};
pub use value::{Record, Value, deep_merge, deep_unique};
