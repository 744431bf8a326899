//! Generic typed repository.
//!
//! Composes statements with [`QueryComposer`] and executes them through the
//! [`Session`]. Reads are generic over the output type (`T: FromRecord`):
//! the entity itself, a response DTO, or a raw [`Record`].

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::query::composer::QueryComposer;
use crate::query::entity::{Entity, FromRecord};
use crate::query::facets::{DEFAULT_MAX_DEPTH, FacetMap, unique_values};
use crate::query::statement::{Delete, Insert, Update};
use crate::query::types::{FilterParam, FilterRequest, ListOptions, OperatorType, SortType};
use crate::query::value::{Record, Value, deep_merge};
use crate::session::Session;

pub struct Repository<E: Entity> {
    session: Arc<Session>,
    composer: QueryComposer,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            composer: QueryComposer::new(E::meta()),
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn composer(&self) -> &QueryComposer {
        &self.composer
    }

    /// Insert a new entity. Generated defaults fill absent columns.
    pub async fn create(&self, attributes: Record) -> Result<E> {
        let meta = E::meta();
        let mut record = self.composer.coerce_attributes(attributes)?;
        let now = Utc::now();

        for column in meta.columns {
            if record.contains_key(column.name) {
                continue;
            }
            match column.generate_default(now) {
                Some(value) => {
                    record.insert(column.name, value);
                }
                None if column.nullable => {
                    record.insert(column.name, Value::Null);
                }
                None => {
                    return Err(Error::UnprocessableEntity(format!(
                        "field {} is required for {}",
                        column.name, meta.name
                    )));
                }
            }
        }

        let stored = self
            .session
            .insert(&Insert {
                entity: meta,
                record,
            })
            .await?;
        E::from_record(stored)
    }

    /// Apply `attributes` to `model` and persist it.
    ///
    /// Map-valued attributes are merged into a current map value rather
    /// than replacing it.
    pub async fn update(&self, model: &E, attributes: Record) -> Result<E> {
        let meta = E::meta();
        let attributes = self.composer.coerce_attributes(attributes)?;
        let mut current = model.to_record();
        let id = current.get(meta.primary_key).cloned().unwrap_or_default();

        let mut values = Record::new();
        for (name, value) in attributes {
            let merged = match (current.remove(&name), value) {
                (Some(Value::Map(mut existing)), Value::Map(update)) => {
                    deep_merge(&mut existing, update);
                    Value::Map(existing)
                }
                (_, value) => value,
            };
            values.insert(name, merged);
        }
        bump_on_update::<E>(&mut values);

        let update = Update {
            entity: meta,
            filter: Some(self.composer.by_primary_key(id.clone())?),
            values,
        };
        let mut rows = self.session.update(&update).await?;
        match rows.pop() {
            Some(row) => E::from_record(row),
            None => Err(not_found::<E>(meta.primary_key, &id)),
        }
    }

    /// Delete `model` by primary key and return it as it was stored.
    pub async fn delete(&self, model: &E) -> Result<E> {
        let meta = E::meta();
        let id = model
            .to_record()
            .get(meta.primary_key)
            .cloned()
            .unwrap_or_default();
        let delete = Delete {
            entity: meta,
            filter: Some(self.composer.by_primary_key(id.clone())?),
        };
        let mut rows = self.session.delete(&delete).await?;
        match rows.pop() {
            Some(row) => E::from_record(row),
            None => Err(not_found::<E>(meta.primary_key, &id)),
        }
    }

    pub async fn get_all<T: FromRecord>(&self, options: &ListOptions) -> Result<Vec<T>> {
        self.get_by_filters(None, options).await
    }

    /// Rows where `field` compared to `value` with `operator` holds.
    pub async fn get_by<T: FromRecord>(
        &self,
        field: &str,
        value: impl Into<Value>,
        operator: OperatorType,
        options: &ListOptions,
    ) -> Result<Vec<T>> {
        let request = FilterRequest::all(vec![FilterParam::new(field, value, operator)]);
        self.get_by_filters(Some(&request), options).await
    }

    /// The single row where `field` compared to `value` with `operator` holds.
    pub async fn get_one_by<T: FromRecord>(
        &self,
        field: &str,
        value: impl Into<Value>,
        operator: OperatorType,
        options: &ListOptions,
    ) -> Result<Option<T>> {
        let request = FilterRequest::all(vec![FilterParam::new(field, value, operator)]);
        self.get_one_by_filters(&request, options).await
    }

    pub async fn get_by_id<T: FromRecord>(
        &self,
        id: impl Into<Value>,
        options: &ListOptions,
    ) -> Result<Option<T>> {
        self.get_one_by(E::meta().primary_key, id, OperatorType::Equals, options)
            .await
    }

    pub async fn get_by_filters<T: FromRecord>(
        &self,
        request: Option<&FilterRequest>,
        options: &ListOptions,
    ) -> Result<Vec<T>> {
        let select = self.composer.list(request, options)?;
        self.session
            .fetch_all(&select)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    /// The single row matching `request`. Pagination in `options` is
    /// ignored.
    pub async fn get_one_by_filters<T: FromRecord>(
        &self,
        request: &FilterRequest,
        options: &ListOptions,
    ) -> Result<Option<T>> {
        let select = self
            .composer
            .with_related(self.composer.query(), options.with_related.as_slice())?;
        let select = self
            .composer
            .apply_projection(select, options.projection.as_deref())?;
        let select = self.composer.filter(select, request)?;
        self.session
            .fetch_optional(&select)
            .await?
            .map(T::from_record)
            .transpose()
    }

    pub async fn count(&self, request: Option<&FilterRequest>) -> Result<u64> {
        let select = self.composer.count(request)?;
        self.session.count(&select).await
    }

    /// Update every row matching `request`.
    pub async fn update_by_filters(
        &self,
        request: &FilterRequest,
        attributes: Record,
    ) -> Result<Vec<E>> {
        let mut update = self.composer.update(request, attributes)?;
        bump_on_update::<E>(&mut update.values);
        self.session
            .update(&update)
            .await?
            .into_iter()
            .map(E::from_record)
            .collect()
    }

    /// Delete every row matching `request`.
    pub async fn delete_by_filters(&self, request: &FilterRequest) -> Result<Vec<E>> {
        let delete = self.composer.delete(request)?;
        self.session
            .delete(&delete)
            .await?
            .into_iter()
            .map(E::from_record)
            .collect()
    }

    /// Distinct values per column, one relation level deep.
    pub async fn get_columns_unique_values(
        &self,
        request: Option<&FilterRequest>,
        sort_type: SortType,
    ) -> Result<FacetMap> {
        unique_values(
            &self.session,
            E::meta(),
            request.cloned(),
            sort_type,
            0,
            DEFAULT_MAX_DEPTH,
        )
        .await
    }
}

/// Set every `on_update` column of `E` to the current time.
fn bump_on_update<E: Entity>(values: &mut Record) {
    let now = Utc::now();
    for column in E::meta().columns.iter().filter(|c| c.on_update) {
        values.insert(column.name, now);
    }
}

fn not_found<E: Entity>(field: &str, value: &Value) -> Error {
    Error::NotFound(format!("{} with {field}={value}", E::meta().name))
}

/// Attributes as a record, from `(name, value)` pairs.
pub fn attributes<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Record
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().collect()
}

/// Attributes from a JSON object. Anything else is a bad request.
pub fn attributes_from_json(json: serde_json::Value) -> Result<Record> {
    match Value::from(json) {
        Value::Map(map) => Ok(Record::from(map)),
        other => Err(Error::BadRequest(format!(
            "attributes must be an object, got {}",
            other.type_name()
        ))),
    }
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            composer: self.composer,
            _entity: PhantomData,
        }
    }
}
