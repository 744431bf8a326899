#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Shared fixtures for integration tests.
//!
//! Entities with relations in both directions, plus helpers that seed an
//! in-memory storage and wrap it in a session. Tests run against the real
//! repository and controller code; only the storage is in-process.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use recordkit_kernel::controller::Controller;
use recordkit_kernel::error::Result;
use recordkit_kernel::models::{USER, User};
use recordkit_kernel::query::entity::{
    ColumnDefault, ColumnMeta, ColumnType, Entity, EntityMeta, FromRecord, RelationDirection,
    RelationMeta,
};
use recordkit_kernel::query::value::{Record, Value};
use recordkit_kernel::repository::Repository;
use recordkit_kernel::session::Session;
use recordkit_kernel::storage::MemoryStorage;

fn author_meta() -> &'static EntityMeta {
    &AUTHOR
}

fn post_meta() -> &'static EntityMeta {
    &POST
}

pub static AUTHOR: EntityMeta = EntityMeta {
    name: "Author",
    table: "author",
    primary_key: "id",
    columns: &[
        ColumnMeta::new("id", ColumnType::Integer),
        ColumnMeta::new("name", ColumnType::Text).unique(),
        ColumnMeta::new("country", ColumnType::Text).nullable(),
        ColumnMeta::new("settings", ColumnType::Json).nullable(),
        ColumnMeta::new("updated_at", ColumnType::DateTime)
            .default(ColumnDefault::Now)
            .on_update(),
    ],
    relations: &[RelationMeta {
        name: "posts",
        direction: RelationDirection::OneToMany,
        target: post_meta,
        local_column: "id",
        remote_column: "author_id",
    }],
};

pub static POST: EntityMeta = EntityMeta {
    name: "Post",
    table: "post",
    primary_key: "id",
    columns: &[
        ColumnMeta::new("id", ColumnType::Integer),
        ColumnMeta::new("title", ColumnType::Text),
        ColumnMeta::new("views", ColumnType::Integer),
        ColumnMeta::new("author_id", ColumnType::Integer).nullable(),
        ColumnMeta::new("published_at", ColumnType::DateTime).nullable(),
        ColumnMeta::new("updated_at", ColumnType::DateTime)
            .default(ColumnDefault::Now)
            .on_update(),
    ],
    relations: &[RelationMeta {
        name: "author",
        direction: RelationDirection::ManyToOne,
        target: author_meta,
        local_column: "author_id",
        remote_column: "id",
    }],
};

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
    pub settings: Value,
    pub updated_at: DateTime<Utc>,
}

impl FromRecord for Author {
    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            name: record.take("name")?,
            country: record.take("country")?,
            settings: record.take("settings")?,
            updated_at: record.take("updated_at")?,
        })
    }
}

impl Entity for Author {
    fn meta() -> &'static EntityMeta {
        &AUTHOR
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id", self.id);
        record.insert("name", self.name.as_str());
        record.insert("country", self.country.clone());
        record.insert("settings", self.settings.clone());
        record.insert("updated_at", self.updated_at);
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub views: i64,
    pub author_id: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FromRecord for Post {
    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("id")?,
            title: record.take("title")?,
            views: record.take("views")?,
            author_id: record.take("author_id")?,
            published_at: record.take("published_at")?,
            updated_at: record.take("updated_at")?,
        })
    }
}

impl Entity for Post {
    fn meta() -> &'static EntityMeta {
        &POST
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id", self.id);
        record.insert("title", self.title.as_str());
        record.insert("views", self.views);
        record.insert("author_id", self.author_id);
        record.insert("published_at", self.published_at);
        record.insert("updated_at", self.updated_at);
        record
    }
}

/// Fixed timestamp `minutes` after a base instant.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().cloned().collect()
}

pub fn author_row(id: i64, name: &str, country: Option<&str>, minutes: i64) -> Record {
    record(&[
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("country", Value::from(country)),
        ("settings", Value::Null),
        ("updated_at", Value::from(at(minutes))),
    ])
}

pub fn post_row(id: i64, title: &str, views: i64, author_id: Option<i64>, minutes: i64) -> Record {
    record(&[
        ("id", Value::Int(id)),
        ("title", Value::from(title)),
        ("views", Value::Int(views)),
        ("author_id", Value::from(author_id)),
        ("published_at", Value::Null),
        ("updated_at", Value::from(at(minutes))),
    ])
}

/// Storage with three authors and five posts.
///
/// | post | author | views |
/// |------|--------|-------|
/// | 1    | 1      | 10    |
/// | 2    | 1      | 250   |
/// | 3    | 2      | 40    |
/// | 4    | none   | 5     |
/// | 5    | 2      | 40    |
pub fn blog_storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.seed(
        &AUTHOR,
        [
            author_row(1, "ada", Some("uk"), 3),
            author_row(2, "grace", Some("us"), 1),
            author_row(3, "linus", None, 2),
        ],
    );
    storage.seed(
        &POST,
        [
            post_row(1, "Engines", 10, Some(1), 5),
            post_row(2, "Notes on 100% coverage", 250, Some(1), 1),
            post_row(3, "Compilers", 40, Some(2), 4),
            post_row(4, "Anonymous", 5, None, 2),
            post_row(5, "Bugs", 40, Some(2), 3),
        ],
    );
    storage
}

pub fn user_row(username: &str, email: &str, minutes: i64) -> Record {
    record(&[
        ("id", Value::from(Uuid::now_v7())),
        ("username", Value::from(username)),
        ("email", Value::from(email)),
        ("hashed_password", Value::from("hash")),
        ("created_at", Value::from(at(minutes))),
        ("updated_at", Value::from(at(minutes))),
    ])
}

/// Storage with three users.
pub fn user_storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.seed(
        &USER,
        [
            user_row("x", "x@example.com", 2),
            user_row("alice", "a@b.com", 1),
            user_row("bob", "bob@example.com", 3),
        ],
    );
    storage
}

pub fn session(storage: &MemoryStorage) -> Arc<Session> {
    Arc::new(Session::single(Arc::new(storage.clone())))
}

pub fn default_exclusions() -> Arc<BTreeSet<String>> {
    Arc::new(
        ["id", "created_at", "updated_at"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

pub fn user_controller(storage: &MemoryStorage) -> Controller<User> {
    Controller::new(Repository::new(session(storage)), default_exclusions())
}

pub fn post_repository(storage: &MemoryStorage) -> Repository<Post> {
    Repository::new(session(storage))
}

pub fn author_repository(storage: &MemoryStorage) -> Repository<Author> {
    Repository::new(session(storage))
}
