//! Distinct values per column ("facets").
//!
//! Every column is distinct-aggregated on its own, then each many-to-one
//! relation is explored one level down, restricted to the foreign key
//! values found on the root entity. The whole tree is deduplicated at the
//! end.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use super::composer::QueryComposer;
use super::entity::{EntityMeta, RelationDirection};
use super::types::{FilterParam, FilterRequest, OperatorType, SortType};
use super::value::{Value, deep_unique};
use crate::error::Result;
use crate::session::Session;

/// Relation depth explored by default.
pub const DEFAULT_MAX_DEPTH: usize = 1;

/// Column name to ordered distinct values, plus nested maps keyed by
/// relation name.
pub type FacetMap = BTreeMap<String, Value>;

type FacetFuture<'a> = Pin<Box<dyn Future<Output = Result<FacetMap>> + Send + 'a>>;

/// Facets of `entity` over the rows matching `filter`.
pub fn unique_values<'a>(
    session: &'a Session,
    entity: &'static EntityMeta,
    filter: Option<FilterRequest>,
    sort_type: SortType,
    depth: usize,
    max_depth: usize,
) -> FacetFuture<'a> {
    Box::pin(async move {
        let composer = QueryComposer::new(entity);
        let base = composer.count(filter.as_ref())?;

        let mut values = FacetMap::new();
        for column in entity.columns {
            let select = base.clone().distinct_column(column, sort_type);
            let rows = session.fetch_all(&select).await?;
            let distinct = rows
                .into_iter()
                .map(|mut row| row.remove(column.name).unwrap_or_default())
                .collect();
            values.insert(column.name.to_string(), Value::List(distinct));
        }

        if depth < max_depth {
            for relation in entity.relations {
                if relation.direction != RelationDirection::ManyToOne {
                    continue;
                }
                let Some(Value::List(keys)) = values.get(relation.local_column) else {
                    continue;
                };
                let keys: Vec<Value> = keys.iter().filter(|k| !k.is_null()).cloned().collect();
                if keys.is_empty() {
                    continue;
                }

                let sub_filter = FilterRequest::all(vec![FilterParam::new(
                    relation.remote_column,
                    Value::List(keys),
                    OperatorType::In,
                )]);
                let nested = unique_values(
                    session,
                    relation.target(),
                    Some(sub_filter),
                    sort_type,
                    depth + 1,
                    max_depth,
                )
                .await?;
                values.insert(relation.name.to_string(), Value::Map(nested));
            }
        }

        Ok(match deep_unique(Value::Map(values)) {
            Value::Map(map) => map,
            _ => FacetMap::new(),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::entity::{ColumnMeta, ColumnType, RelationMeta};
    use crate::query::value::Record;
    use crate::storage::MemoryStorage;

    fn region() -> &'static EntityMeta {
        &REGION
    }

    static REGION: EntityMeta = EntityMeta {
        name: "Region",
        table: "region",
        primary_key: "id",
        columns: &[
            ColumnMeta::new("id", ColumnType::Integer),
            ColumnMeta::new("code", ColumnType::Text),
        ],
        relations: &[],
    };

    static SITE: EntityMeta = EntityMeta {
        name: "Site",
        table: "site",
        primary_key: "id",
        columns: &[
            ColumnMeta::new("id", ColumnType::Integer),
            ColumnMeta::new("kind", ColumnType::Text),
            ColumnMeta::new("region_id", ColumnType::Integer).nullable(),
        ],
        relations: &[RelationMeta {
            name: "region",
            direction: RelationDirection::ManyToOne,
            target: region,
            local_column: "region_id",
            remote_column: "id",
        }],
    };

    fn row(values: &[(&str, Value)]) -> Record {
        values.iter().cloned().collect()
    }

    fn session() -> Session {
        let storage = MemoryStorage::new();
        storage.seed(
            &REGION,
            [
                row(&[("id", Value::Int(1)), ("code", Value::from("north"))]),
                row(&[("id", Value::Int(2)), ("code", Value::from("south"))]),
                row(&[("id", Value::Int(3)), ("code", Value::from("east"))]),
            ],
        );
        storage.seed(
            &SITE,
            [
                row(&[("id", Value::Int(10)), ("kind", Value::from("b")), ("region_id", Value::Int(2))]),
                row(&[("id", Value::Int(11)), ("kind", Value::from("a")), ("region_id", Value::Int(1))]),
                row(&[("id", Value::Int(12)), ("kind", Value::from("b")), ("region_id", Value::Null)]),
            ],
        );
        Session::single(Arc::new(storage))
    }

    #[tokio::test]
    async fn columns_and_one_relation_level() {
        let session = session();
        let facets = unique_values(&session, &SITE, None, SortType::Asc, 0, DEFAULT_MAX_DEPTH)
            .await
            .unwrap();

        assert_eq!(
            facets["kind"],
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            facets["region_id"],
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Null])
        );
        let Value::Map(region) = &facets["region"] else {
            panic!("expected nested region facets");
        };
        assert_eq!(
            region["code"],
            Value::List(vec![Value::from("north"), Value::from("south")])
        );
    }

    #[tokio::test]
    async fn descending_order() {
        let session = session();
        let facets = unique_values(&session, &SITE, None, SortType::Desc, 0, DEFAULT_MAX_DEPTH)
            .await
            .unwrap();
        assert_eq!(
            facets["kind"],
            Value::List(vec![Value::from("b"), Value::from("a")])
        );
    }

    #[tokio::test]
    async fn relation_without_keys_is_skipped() {
        let session = session();
        let filter = FilterRequest::all(vec![FilterParam::equals("id", 12)]);
        let facets = unique_values(&session, &SITE, Some(filter), SortType::Asc, 0, DEFAULT_MAX_DEPTH)
            .await
            .unwrap();
        assert!(!facets.contains_key("region"));
        assert_eq!(facets["kind"], Value::List(vec![Value::from("b")]));
    }

    #[tokio::test]
    async fn max_depth_bounds_recursion() {
        let session = session();
        let facets = unique_values(&session, &SITE, None, SortType::Asc, 0, 0)
            .await
            .unwrap();
        assert!(!facets.contains_key("region"));
    }
}
