//! Controller layer: paginated envelopes, not-found translation and
//! attribute exclusion on writes.
//!
//! Mutating operations run inside the session's transaction. When the
//! caller has not opened one, the operation opens it and commits on
//! success or rolls back on error.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::entity::{Entity, FromRecord};
use crate::query::facets::FacetMap;
use crate::query::types::{
    FilterParam, FilterRequest, ListOptions, OperatorType, PaginationParams, SortType,
};
use crate::query::value::{Record, Value};
use crate::repository::Repository;
use crate::session::Session;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationResponse<T> {
    pub data: Vec<T>,
    /// 1-based page number.
    pub page: i64,
    /// Number of items on this page.
    pub page_size: usize,
    pub total_pages: u64,
    pub total_count: u64,
}

impl<T> PaginationResponse<T> {
    pub fn new(data: Vec<T>, pagination: &PaginationParams, total_count: u64) -> Self {
        Self {
            page: pagination.page(),
            page_size: data.len(),
            total_pages: pagination.total_pages(total_count),
            total_count,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Facet map for populating filter options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForFiltersResponse {
    pub columns: FacetMap,
}

pub struct Controller<E: Entity> {
    repository: Repository<E>,
    exclude_fields: Arc<BTreeSet<String>>,
}

impl<E: Entity> Controller<E> {
    pub fn new(repository: Repository<E>, exclude_fields: Arc<BTreeSet<String>>) -> Self {
        Self {
            repository,
            exclude_fields,
        }
    }

    pub fn repository(&self) -> &Repository<E> {
        &self.repository
    }

    fn session(&self) -> &Arc<Session> {
        self.repository.session()
    }

    fn not_found(field: &str, value: &Value) -> Error {
        Error::NotFound(format!("{} with {field}={value}", E::meta().name))
    }

    /// Reject attributes in the exclusion set before anything is executed.
    fn check_excluded(&self, attributes: &Record) -> Result<()> {
        match attributes
            .keys()
            .find(|key| self.exclude_fields.contains(*key))
        {
            Some(key) => Err(Error::UnprocessableEntity(format!(
                "field {key} cannot be modified"
            ))),
            None => Ok(()),
        }
    }

    async fn transactional<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let owned = self.session().begin_if_idle().await?;
        let result = operation.await;
        if owned {
            self.session().finish(result).await
        } else {
            result
        }
    }

    pub async fn get_by_id<T: FromRecord>(
        &self,
        id: impl Into<Value>,
        options: &ListOptions,
    ) -> Result<T> {
        let id = id.into();
        self.repository
            .get_by_id(id.clone(), options)
            .await?
            .ok_or_else(|| Self::not_found(E::meta().primary_key, &id))
    }

    pub async fn get_one_by<T: FromRecord>(
        &self,
        field: &str,
        value: impl Into<Value>,
        operator: OperatorType,
        options: &ListOptions,
    ) -> Result<T> {
        let value = value.into();
        self.repository
            .get_one_by(field, value.clone(), operator, options)
            .await?
            .ok_or_else(|| Self::not_found(field, &value))
    }

    pub async fn get_one_by_filters<T: FromRecord>(
        &self,
        request: &FilterRequest,
        options: &ListOptions,
    ) -> Result<T> {
        self.repository
            .get_one_by_filters(request, options)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} matching {request}", E::meta().name)))
    }

    /// Page of rows where `field` compared to `value` with `operator`
    /// holds. No match is an error.
    pub async fn get_by<T: FromRecord>(
        &self,
        field: &str,
        value: impl Into<Value>,
        operator: OperatorType,
        options: &ListOptions,
    ) -> Result<PaginationResponse<T>> {
        let value = value.into();
        let data: Vec<T> = self
            .repository
            .get_by(field, value.clone(), operator, options)
            .await?;
        if data.is_empty() {
            return Err(Self::not_found(field, &value));
        }
        let request = FilterRequest::all(vec![FilterParam::new(field, value, operator)]);
        let total_count = self.repository.count(Some(&request)).await?;
        Ok(PaginationResponse::new(data, &options.pagination, total_count))
    }

    pub async fn get_by_filters<T: FromRecord>(
        &self,
        request: &FilterRequest,
        options: &ListOptions,
    ) -> Result<PaginationResponse<T>> {
        let data = self
            .repository
            .get_by_filters(Some(request), options)
            .await?;
        let total_count = self.repository.count(Some(request)).await?;
        Ok(PaginationResponse::new(data, &options.pagination, total_count))
    }

    pub async fn get_all<T: FromRecord>(
        &self,
        options: &ListOptions,
    ) -> Result<PaginationResponse<T>> {
        let data = self.repository.get_all(options).await?;
        let total_count = self.repository.count(None).await?;
        Ok(PaginationResponse::new(data, &options.pagination, total_count))
    }

    pub async fn count(&self, request: Option<&FilterRequest>) -> Result<CountResponse> {
        let count = self.repository.count(request).await?;
        Ok(CountResponse { count })
    }

    pub async fn get_for_filters(
        &self,
        request: Option<&FilterRequest>,
        sort_type: SortType,
    ) -> Result<ForFiltersResponse> {
        let columns = self
            .repository
            .get_columns_unique_values(request, sort_type)
            .await?;
        Ok(ForFiltersResponse { columns })
    }

    pub async fn create(&self, attributes: Record) -> Result<E> {
        self.check_excluded(&attributes)?;
        self.transactional(self.repository.create(attributes)).await
    }

    pub async fn update(&self, model: &E, attributes: Record) -> Result<E> {
        self.check_excluded(&attributes)?;
        self.transactional(self.repository.update(model, attributes))
            .await
    }

    pub async fn update_by_filters(
        &self,
        request: &FilterRequest,
        attributes: Record,
    ) -> Result<Vec<E>> {
        self.check_excluded(&attributes)?;
        self.transactional(self.repository.update_by_filters(request, attributes))
            .await
    }

    pub async fn delete(&self, model: &E) -> Result<E> {
        self.transactional(self.repository.delete(model)).await
    }

    pub async fn delete_by_filters(&self, request: &FilterRequest) -> Result<Vec<E>> {
        self.transactional(self.repository.delete_by_filters(request))
            .await
    }
}
