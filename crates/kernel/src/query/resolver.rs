//! Field path resolution against entity metadata.
//!
//! A field is either a column of the root entity (`email`) or one relation
//! hop followed by a column of the related entity (`author.name`).

use super::entity::{ColumnMeta, ColumnType, EntityMeta, RelationMeta};
use crate::error::{Error, Result};

/// Separator between a relation name and a column.
pub const PATH_SEPARATOR: char = '.';

/// A field path resolved to a concrete column.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField {
    /// Relation traversed, `None` for root columns.
    pub relation: Option<&'static RelationMeta>,
    /// Entity owning the column.
    pub entity: &'static EntityMeta,
    pub column: &'static ColumnMeta,
}

impl ResolvedField {
    /// A column of `entity` itself.
    pub fn root(entity: &'static EntityMeta, column: &str) -> Result<Self> {
        let column = entity
            .column(column)
            .ok_or_else(|| unknown_field(column, entity))?;
        Ok(Self {
            relation: None,
            entity,
            column,
        })
    }

    pub fn is_related(&self) -> bool {
        self.relation.is_some()
    }

    /// Dotted path naming this field.
    pub fn path(&self) -> String {
        match self.relation {
            Some(relation) => format!("{}{PATH_SEPARATOR}{}", relation.name, self.column.name),
            None => self.column.name.to_string(),
        }
    }
}

fn unknown_field(field: &str, entity: &EntityMeta) -> Error {
    Error::Field(format!("field {field} does not exist on {}", entity.name))
}

/// Resolves field paths for one root entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver {
    entity: &'static EntityMeta,
}

impl FieldResolver {
    pub fn new(entity: &'static EntityMeta) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &'static EntityMeta {
        self.entity
    }

    /// Whether the root segment of `field` names a column or a relation.
    ///
    /// The part after the separator is not checked here.
    pub fn has_field(&self, field: &str) -> bool {
        let root = root_segment(field);
        self.entity.has_column(root) || self.entity.relation(root).is_some()
    }

    /// Fail with [`Error::Field`] unless [`has_field`](Self::has_field) holds.
    pub fn validate(&self, field: &str) -> Result<()> {
        if self.has_field(field) {
            Ok(())
        } else {
            Err(unknown_field(field, self.entity))
        }
    }

    /// Relation of the root entity by name.
    pub fn relation(&self, name: &str) -> Result<&'static RelationMeta> {
        self.entity.relation(name).ok_or_else(|| {
            Error::Field(format!(
                "relation {name} does not exist on {}",
                self.entity.name
            ))
        })
    }

    pub fn resolve(&self, field: &str) -> Result<ResolvedField> {
        let mut segments = field.split(PATH_SEPARATOR);
        let (Some(first), second, None) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(Error::Field(format!(
                "field {field} traverses more than one relation"
            )));
        };

        let Some(column_name) = second else {
            if self.entity.relation(first).is_some() {
                return Err(Error::Field(format!(
                    "field {field} is a relation of {}, not a column",
                    self.entity.name
                )));
            }
            return ResolvedField::root(self.entity, first);
        };

        let relation = self.entity.relation(first).ok_or_else(|| {
            Error::Field(format!(
                "relation {first} does not exist on {}",
                self.entity.name
            ))
        })?;
        let target = relation.target();
        let column = target
            .column(column_name)
            .ok_or_else(|| unknown_field(field, target))?;

        Ok(ResolvedField {
            relation: Some(relation),
            entity: target,
            column,
        })
    }

    pub fn field_type(&self, field: &str) -> Result<ColumnType> {
        self.resolve(field).map(|resolved| resolved.column.kind)
    }
}

fn root_segment(field: &str) -> &str {
    field.split(PATH_SEPARATOR).next().unwrap_or(field)
}
