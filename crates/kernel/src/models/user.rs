//! User model and its response DTO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::query::entity::{
    ColumnDefault, ColumnMeta, ColumnType, Entity, EntityMeta, FromRecord,
};
use crate::query::value::Record;

/// Metadata of the `user` table.
pub static USER: EntityMeta = EntityMeta {
    name: "User",
    table: "user",
    primary_key: "id",
    columns: &[
        ColumnMeta::new("id", ColumnType::Uuid).default(ColumnDefault::GeneratedUuid),
        ColumnMeta::new("username", ColumnType::Text).unique(),
        ColumnMeta::new("email", ColumnType::Text).unique(),
        ColumnMeta::new("hashed_password", ColumnType::Text),
        ColumnMeta::new("created_at", ColumnType::DateTime).default(ColumnDefault::Now),
        ColumnMeta::new("updated_at", ColumnType::DateTime)
            .default(ColumnDefault::Now)
            .on_update(),
    ],
    relations: &[],
};

/// User record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRecord for User {
    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            username: record.take("username")?,
            email: record.take("email")?,
            hashed_password: record.take("hashed_password")?,
            created_at: record.take("created_at")?,
            updated_at: record.take("updated_at")?,
        })
    }
}

impl Entity for User {
    fn meta() -> &'static EntityMeta {
        &USER
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id", self.id);
        record.insert("username", self.username.as_str());
        record.insert("email", self.email.as_str());
        record.insert("hashed_password", self.hashed_password.as_str());
        record.insert("created_at", self.created_at);
        record.insert("updated_at", self.updated_at);
        record
    }
}

/// User as returned to clients. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FromRecord for UserResponse {
    fn from_record(mut record: Record) -> Result<Self> {
        let id: Uuid = record.take("id")?;
        Ok(Self {
            id: id.to_string(),
            username: record.take("username")?,
            email: record.take("email")?,
            created_at: record.take("created_at")?,
            updated_at: record.take("updated_at")?,
        })
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            created_at: Some(user.created_at),
            updated_at: Some(user.updated_at),
        }
    }
}
