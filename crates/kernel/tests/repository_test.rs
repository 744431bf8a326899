#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Repository integration tests.
//!
//! Filters, relations, projection, eager loading and writes against the
//! in-memory storage.

mod common;

use recordkit_kernel::error::Error;
use recordkit_kernel::query::entity::Entity;
use recordkit_kernel::query::types::{
    FilterParam, FilterRequest, ListOptions, OperatorType, PaginationParams, SortParams, SortType,
};
use recordkit_kernel::query::value::{Record, Value};
use recordkit_kernel::repository::{attributes, attributes_from_json};
use serde_json::json;

use common::{Author, Post, at, author_repository, blog_storage, post_repository};

fn ids(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|p| p.id).collect()
}

fn filter(field: &str, value: impl Into<Value>, operator: OperatorType) -> FilterRequest {
    FilterRequest::all(vec![FilterParam::new(field, value, operator)])
}

// -------------------------------------------------------------------------
// Filtering
// -------------------------------------------------------------------------

#[tokio::test]
async fn filter_on_related_column() {
    let storage = blog_storage();
    let posts: Vec<Post> = post_repository(&storage)
        .get_by_filters(
            Some(&filter("author.name", "ada", OperatorType::Equals)),
            &ListOptions::default(),
        )
        .await
        .unwrap();

    // default order is updated_at ascending
    assert_eq!(ids(&posts), vec![2, 1]);
}

#[tokio::test]
async fn negated_related_filter_keeps_rows_without_match() {
    let storage = blog_storage();
    let posts: Vec<Post> = post_repository(&storage)
        .get_by_filters(
            Some(&filter("author.country", "uk", OperatorType::NotEqual)),
            &ListOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec![4, 5, 3]);
}

#[tokio::test]
async fn or_combinator() {
    let storage = blog_storage();
    let request = FilterRequest::any(vec![
        FilterParam::new("views", 100, OperatorType::Greater),
        FilterParam::equals("title", "Bugs"),
    ]);
    let posts: Vec<Post> = post_repository(&storage)
        .get_by_filters(Some(&request), &ListOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec![2, 5]);
}

#[tokio::test]
async fn empty_filter_request_places_no_constraint() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    for request in [FilterRequest::all(vec![]), FilterRequest::any(vec![])] {
        let posts: Vec<Post> = repository
            .get_by_filters(Some(&request), &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(posts.len(), 5);
        assert_eq!(repository.count(Some(&request)).await.unwrap(), 5);
    }
}

#[tokio::test]
async fn contains_treats_wildcards_literally() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter("title", "100%", OperatorType::Contains)),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![2]);

    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter("title", "Co", OperatorType::NotStartWith)),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![2, 4, 5, 1]);
}

#[tokio::test]
async fn membership_operators() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter("id", vec![1_i64, 3, 9], OperatorType::In)),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![3, 1]);

    // NULL author_id is unknown under NOT IN and drops out
    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter("author_id", vec![1_i64], OperatorType::NotIn)),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![5, 3]);
}

#[tokio::test]
async fn datetime_strings_are_coerced() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter(
                "updated_at",
                "2024-03-01T12:03:00Z",
                OperatorType::Greater,
            )),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![3, 1]);

    let count = repository
        .count(Some(&filter("updated_at", "2024-03-02", OperatorType::Less)))
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn text_operators_match_datetimes_as_text() {
    let storage = blog_storage();
    let repository = post_repository(&storage);
    let post: Post = repository
        .get_by_id(3, &ListOptions::default())
        .await
        .unwrap()
        .unwrap();
    repository
        .update(&post, attributes([("published_at", "2024-03-01T12:00:00Z")]))
        .await
        .unwrap();

    let posts: Vec<Post> = repository
        .get_by_filters(
            Some(&filter(
                "published_at",
                "2024-03-01T12:00:00Z",
                OperatorType::StartsWith,
            )),
            &ListOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![3]);

    let err = repository
        .count(Some(&filter("published_at", "soon", OperatorType::StartsWith)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(_)));

    let err = repository
        .count(Some(&filter("published_at", 2024, OperatorType::Contains)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(ref m) if m.contains("got int")));
}

#[tokio::test]
async fn null_datetime_filter_is_a_field_error() {
    let storage = blog_storage();
    let err = post_repository(&storage)
        .count(Some(&filter("published_at", Value::Null, OperatorType::Greater)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Field(ref m) if m.contains("got null")));
    assert_eq!(storage.statements_executed(), 0);
}

#[tokio::test]
async fn text_operators_on_numeric_columns_are_bad_requests() {
    let storage = blog_storage();
    let err = post_repository(&storage)
        .count(Some(&filter("views", "4", OperatorType::StartsWith)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BadRequest(_)));
    assert_eq!(storage.statements_executed(), 0);
}

#[tokio::test]
async fn invalid_datetime_is_a_field_error() {
    let storage = blog_storage();
    let err = post_repository(&storage)
        .count(Some(&filter("updated_at", "yesterday", OperatorType::Less)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Field(_)));
    assert_eq!(err.status_code(), 422);
    assert_eq!(storage.statements_executed(), 0);
}

#[tokio::test]
async fn unknown_field_fails_before_storage() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let err = repository
        .get_by_filters::<Post>(
            Some(&filter("missing", 1, OperatorType::Equals)),
            &ListOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(_)));

    let err = repository
        .count(Some(&filter("author.missing", 1, OperatorType::Equals)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(_)));

    let err = repository
        .update_by_filters(&FilterRequest::all(vec![]), attributes([("missing", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(_)));

    assert_eq!(storage.statements_executed(), 0);
}

#[tokio::test]
async fn membership_with_scalar_is_a_bad_request() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    for operator in [OperatorType::In, OperatorType::NotIn] {
        let err = repository
            .count(Some(&filter("views", 10, operator)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
    assert_eq!(storage.statements_executed(), 0);
}

#[tokio::test]
async fn elem_match_is_not_supported() {
    let storage = blog_storage();
    let err = post_repository(&storage)
        .count(Some(&filter("title", "x", OperatorType::ElemMatch)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ELEM_MATCH"));
}

// -------------------------------------------------------------------------
// Sorting and pagination
// -------------------------------------------------------------------------

#[tokio::test]
async fn sort_and_paginate() {
    let storage = blog_storage();
    let options = ListOptions::default()
        .sort(SortParams::by("views", SortType::Desc))
        .paginate(PaginationParams::new(1, 2).unwrap());
    let posts: Vec<Post> = post_repository(&storage)
        .get_all(&options)
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec![3, 5]);
}

#[tokio::test]
async fn unbounded_limit_returns_everything() {
    let storage = blog_storage();
    let options = ListOptions::default()
        .sort(SortParams::by("id", SortType::Asc))
        .paginate(PaginationParams::unbounded());
    let posts: Vec<Post> = post_repository(&storage)
        .get_all(&options)
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn sorting_by_a_relation_is_rejected() {
    let storage = blog_storage();
    let options = ListOptions::default().sort(SortParams::by("author", SortType::Asc));
    let err = post_repository(&storage)
        .get_all::<Post>(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_) | Error::Field(_)));
}

// -------------------------------------------------------------------------
// Projection and eager loading
// -------------------------------------------------------------------------

#[tokio::test]
async fn dotted_projection_loads_related_columns() {
    let storage = blog_storage();
    let options = ListOptions::default()
        .project(["title", "author.name"])
        .sort(SortParams::by("id", SortType::Asc));
    let rows: Vec<Record> = post_repository(&storage)
        .get_all(&options)
        .await
        .unwrap();

    assert_eq!(rows.len(), 5);
    let first = &rows[0];
    let keys: Vec<&str> = first.keys().collect();
    assert_eq!(keys, vec!["author", "author_id", "id", "title"]);

    let Some(Value::Map(author)) = first.get("author") else {
        panic!("expected author map, got {:?}", first.get("author"));
    };
    assert_eq!(author.get("name"), Some(&Value::from("ada")));
    assert_eq!(author.get("id"), Some(&Value::Int(1)));
    assert!(!author.contains_key("country"));

    // post 4 has no author
    assert_eq!(rows[3].get("author"), Some(&Value::Null));
}

#[tokio::test]
async fn with_related_attaches_lists_for_one_to_many() {
    let storage = blog_storage();
    let options = ListOptions::default()
        .with_related(["posts"])
        .sort(SortParams::by("id", SortType::Asc));
    let rows: Vec<Record> = author_repository(&storage)
        .get_all(&options)
        .await
        .unwrap();

    let post_ids = |row: &Record| -> Vec<Value> {
        match row.get("posts") {
            Some(Value::List(posts)) => posts
                .iter()
                .map(|p| p.as_map().and_then(|m| m.get("id")).cloned().unwrap_or_default())
                .collect(),
            other => panic!("expected posts list, got {other:?}"),
        }
    };
    assert_eq!(post_ids(&rows[0]), vec![Value::Int(2), Value::Int(1)]);
    assert_eq!(post_ids(&rows[1]), vec![Value::Int(5), Value::Int(3)]);
    assert!(post_ids(&rows[2]).is_empty());

    // one extra statement for the relation
    assert_eq!(storage.statements_executed(), 2);
}

#[tokio::test]
async fn unknown_relation_is_a_field_error() {
    let storage = blog_storage();
    let options = ListOptions::default().with_related(["comments"]);
    let err = post_repository(&storage)
        .get_all::<Post>(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Field(_)));
}

// -------------------------------------------------------------------------
// Unique lookups
// -------------------------------------------------------------------------

#[tokio::test]
async fn unique_lookups() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let post: Option<Post> = repository
        .get_by_id(3, &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(post.unwrap().title, "Compilers");

    let missing: Option<Post> = repository
        .get_one_by("title", "Nope", OperatorType::Equals, &ListOptions::default())
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = repository
        .get_one_by::<Post>("views", 40, OperatorType::Equals, &ListOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MultipleResults("Post")));

    let popular: Option<Post> = repository
        .get_one_by("views", 100, OperatorType::Greater, &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(popular.unwrap().id, 2);
}

#[tokio::test]
async fn get_by_applies_the_operator() {
    let storage = blog_storage();
    let posts: Vec<Post> = post_repository(&storage)
        .get_by("views", 40, OperatorType::Less, &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![4, 1]);
}

// -------------------------------------------------------------------------
// Writes
// -------------------------------------------------------------------------

#[tokio::test]
async fn create_fills_defaults_and_nullable_columns() {
    let storage = blog_storage();
    let author = author_repository(&storage)
        .create(attributes([("id", Value::Int(4)), ("name", Value::from("barbara"))]))
        .await
        .unwrap();

    assert_eq!(author.id, 4);
    assert_eq!(author.country, None);
    assert_eq!(author.settings, Value::Null);
    assert!(author.updated_at > at(10));
    assert_eq!(storage.rows(Author::meta()).len(), 4);
}

#[tokio::test]
async fn create_requires_columns_without_default() {
    let storage = blog_storage();
    let err = author_repository(&storage)
        .create(attributes([("id", 4)]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnprocessableEntity(_)));
    assert!(err.to_string().contains("name"));
}

#[tokio::test]
async fn create_rejects_duplicates() {
    let storage = blog_storage();
    let err = author_repository(&storage)
        .create(attributes([("id", Value::Int(4)), ("name", Value::from("ada"))]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Duplicate(_)));
    assert_eq!(storage.rows(Author::meta()).len(), 3);
}

#[tokio::test]
async fn update_merges_nested_maps() {
    let storage = blog_storage();
    let repository = author_repository(&storage);

    let created = repository
        .create(
            attributes_from_json(json!({
                "id": 4,
                "name": "barbara",
                "settings": {"theme": {"color": "red", "size": 1}, "lang": "en"}
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let updated = repository
        .update(
            &created,
            attributes_from_json(json!({"settings": {"theme": {"color": "blue"}}})).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        updated.settings,
        Value::from(json!({"theme": {"color": "blue", "size": 1}, "lang": "en"}))
    );
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.name, "barbara");
}

#[tokio::test]
async fn update_by_filters_returns_rows_and_bumps_timestamp() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let updated = repository
        .update_by_filters(
            &filter("author.name", "grace", OperatorType::Equals),
            attributes([("views", 0)]),
        )
        .await
        .unwrap();

    let mut updated_ids = ids(&updated);
    updated_ids.sort_unstable();
    assert_eq!(updated_ids, vec![3, 5]);
    assert!(updated.iter().all(|p| p.views == 0 && p.updated_at > at(10)));

    let untouched: Option<Post> = repository
        .get_by_id(1, &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(untouched.unwrap().views, 10);
}

#[tokio::test]
async fn delete_by_model_and_by_filters() {
    let storage = blog_storage();
    let repository = post_repository(&storage);

    let post: Post = repository
        .get_by_id(4, &ListOptions::default())
        .await
        .unwrap()
        .unwrap();
    let deleted = repository.delete(&post).await.unwrap();
    assert_eq!(deleted.id, 4);

    let err = repository.delete(&post).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let deleted = repository
        .delete_by_filters(&filter("views", 40, OperatorType::EqualsOrLess))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 3);
    assert_eq!(repository.count(None).await.unwrap(), 1);
}
