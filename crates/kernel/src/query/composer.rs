//! Query composition pipeline.
//!
//! Stages run in a fixed order and each is a no-op when its input is
//! absent: base query, related-entity inclusion, projection, filter,
//! sort, pagination. The composer only builds statements; executing them
//! is the storage backend's job.

use std::collections::BTreeMap;

use super::entity::{DEFAULT_SORT_COLUMN, EntityMeta, RelationMeta};
use super::expression::{ExpressionBuilder, Predicate};
use super::resolver::{FieldResolver, PATH_SEPARATOR, ResolvedField};
use super::statement::{Delete, Select, Update};
use super::types::{FilterRequest, ListOptions, PaginationParams, SortParams};
use super::value::{Record, Value};
use crate::error::{Error, Result};

/// Builds statements for one root entity.
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer {
    resolver: FieldResolver,
    builder: ExpressionBuilder,
}

impl QueryComposer {
    pub fn new(entity: &'static EntityMeta) -> Self {
        let resolver = FieldResolver::new(entity);
        Self {
            resolver,
            builder: ExpressionBuilder::new(resolver),
        }
    }

    pub fn entity(&self) -> &'static EntityMeta {
        self.resolver.entity()
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    /// Select everything from the root entity.
    pub fn query(&self) -> Select {
        Select::all(self.entity())
    }

    /// Load the named relations alongside each row.
    pub fn with_related<S: AsRef<str>>(&self, mut select: Select, relations: &[S]) -> Result<Select> {
        for name in relations {
            let relation = self.resolver.relation(name.as_ref())?;
            include(&mut select, relation);
        }
        Ok(select)
    }

    /// Restrict returned columns.
    ///
    /// `relation.column` entries restrict the columns of that relation and
    /// include it; a bare relation name includes it with every column.
    /// The primary key and any join columns are always kept.
    pub fn apply_projection<S: AsRef<str>>(
        &self,
        mut select: Select,
        projection: Option<&[S]>,
    ) -> Result<Select> {
        let Some(projection) = projection.filter(|p| !p.is_empty()) else {
            return Ok(select);
        };
        for field in projection {
            self.resolver.validate(field.as_ref())?;
        }

        let entity = self.entity();
        let mut columns = vec![entity.primary_key];
        let mut related: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();

        for field in projection {
            let field = field.as_ref();
            if !field.contains(PATH_SEPARATOR)
                && let Some(relation) = entity.relation(field)
            {
                include(&mut select, relation);
                continue;
            }
            let resolved = self.resolver.resolve(field)?;
            match resolved.relation {
                None => push_unique(&mut columns, resolved.column.name),
                Some(relation) => {
                    include(&mut select, relation);
                    let target = relation.target();
                    let list = related
                        .entry(relation.name)
                        .or_insert_with(|| vec![target.primary_key]);
                    push_unique(list, relation.remote_column);
                    push_unique(list, resolved.column.name);
                }
            }
        }

        for relation in &select.include {
            push_unique(&mut columns, relation.local_column);
        }
        select.columns = Some(columns);
        select.related_columns.extend(related);
        Ok(select)
    }

    /// Combine the conditions of `request` into the WHERE clause.
    pub fn filter(&self, mut select: Select, request: &FilterRequest) -> Result<Select> {
        if let Some(predicate) = self.predicate(request)? {
            select.filter = Some(predicate);
        }
        Ok(select)
    }

    /// Predicate tree for `request`, `None` when it has no conditions.
    pub fn predicate(&self, request: &FilterRequest) -> Result<Option<Predicate>> {
        self.builder.build_request(request)
    }

    /// Order by `sort.sort_by`, falling back to the last-modified column.
    pub fn sort_by(&self, mut select: Select, sort: &SortParams) -> Result<Select> {
        let entity = self.entity();
        let sort_by = match sort.sort_by.as_deref() {
            Some(field) => field,
            None if entity.has_column(DEFAULT_SORT_COLUMN) => DEFAULT_SORT_COLUMN,
            None => return Ok(select),
        };
        self.resolver.validate(sort_by)?;

        let column = entity.column(sort_by).ok_or_else(|| {
            Error::BadRequest(format!(
                "field {sort_by} is not a column of {}",
                entity.name
            ))
        })?;
        select.order_by = Some((column, sort.sort_type));
        Ok(select)
    }

    /// Skip and take. An unbounded limit leaves the statement untouched.
    pub fn paginate(&self, mut select: Select, pagination: &PaginationParams) -> Select {
        if !pagination.is_unbounded() {
            select.offset = Some(pagination.skip.max(0) as u64);
            select.limit = Some(pagination.limit as u64);
        }
        select
    }

    /// Full read pipeline.
    pub fn list(&self, request: Option<&FilterRequest>, options: &ListOptions) -> Result<Select> {
        let select = self.with_related(self.query(), options.with_related.as_slice())?;
        let select = self.apply_projection(select, options.projection.as_deref())?;
        let select = match request {
            Some(request) => self.filter(select, request)?,
            None => select,
        };
        let select = self.sort_by(select, &options.sort)?;
        Ok(self.paginate(select, &options.pagination))
    }

    /// Base query plus filter, for counting.
    pub fn count(&self, request: Option<&FilterRequest>) -> Result<Select> {
        match request {
            Some(request) => self.filter(self.query(), request),
            None => Ok(self.query()),
        }
    }

    /// Bulk update restricted by `request`. Attribute names must be
    /// columns; values are coerced to the column types.
    pub fn update(&self, request: &FilterRequest, attributes: Record) -> Result<Update> {
        Ok(Update {
            entity: self.entity(),
            filter: self.predicate(request)?,
            values: self.coerce_attributes(attributes)?,
        })
    }

    /// Bulk delete restricted by `request`.
    pub fn delete(&self, request: &FilterRequest) -> Result<Delete> {
        Ok(Delete {
            entity: self.entity(),
            filter: self.predicate(request)?,
        })
    }

    /// Predicate matching the row whose primary key is `id`.
    pub fn by_primary_key(&self, id: Value) -> Result<Predicate> {
        let field = ResolvedField::root(self.entity(), self.entity().primary_key)?;
        let value = field.column.coerce(field.column.name, id)?;
        Ok(Predicate::equals(field, value))
    }

    /// Validate attribute names against the root columns and coerce values.
    pub fn coerce_attributes(&self, attributes: Record) -> Result<Record> {
        let entity = self.entity();
        attributes
            .into_iter()
            .map(|(name, value)| {
                let column = entity.column(&name).ok_or_else(|| {
                    Error::Field(format!("field {name} does not exist on {}", entity.name))
                })?;
                let value = column.coerce(&name, value)?;
                Ok((name, value))
            })
            .collect()
    }
}

fn include(select: &mut Select, relation: &'static RelationMeta) {
    if !select.include.iter().any(|r| r.name == relation.name) {
        select.include.push(relation);
    }
}

fn push_unique(list: &mut Vec<&'static str>, name: &'static str) {
    if !list.contains(&name) {
        list.push(name);
    }
}
