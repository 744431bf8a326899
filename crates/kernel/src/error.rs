//! Error types for the query engine, repositories and controllers.
//!
//! Every failure is raised at the point of detection and never retried.
//! An outer HTTP layer renders errors through [`Error::status_code`] and
//! [`ErrorResponse`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SQLSTATE code PostgreSQL reports for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Kernel errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed operator, combinator or value shape.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown field or a value that cannot be coerced to the column type.
    #[error("invalid field: {0}")]
    Field(String),

    /// Forbidden attribute or missing required attribute on a write.
    #[error("unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// A unique column already holds the value.
    #[error("duplicate value: {0}")]
    Duplicate(String),

    /// Lookup with zero matches.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique lookup matched more than one row.
    #[error("multiple {0} rows matched a unique lookup")]
    MultipleResults(&'static str),

    /// A stored record could not be turned into the requested output type.
    #[error("decode error: {0}")]
    Decode(String),

    /// Storage backend failure that is not a database driver error.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// HTTP status code an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::Field(_) | Error::UnprocessableEntity(_) | Error::Duplicate(_) => 422,
            Error::NotFound(_) => 404,
            Error::Database(e) if is_unique_violation(e) => 422,
            Error::MultipleResults(_)
            | Error::Decode(_)
            | Error::Storage(_)
            | Error::Database(_) => 500,
        }
    }

    /// Client-facing representation. Internal details are not exposed.
    pub fn to_response(&self) -> ErrorResponse {
        let detail = match self {
            Error::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            Error::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        ErrorResponse {
            error_code: self.status_code(),
            detail,
        }
    }

    /// Map a driver error, surfacing unique violations as [`Error::Duplicate`].
    pub fn from_database(error: sqlx::Error) -> Self {
        if is_unique_violation(&error) {
            let detail = match &error {
                sqlx::Error::Database(db) => db.message().to_string(),
                other => other.to_string(),
            };
            return Error::Duplicate(detail);
        }
        Error::Database(error)
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Error body handed to the outer HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: u16,
    pub detail: String,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Error::BadRequest("x".into()).status_code(), 400);
        assert_eq!(Error::Field("x".into()).status_code(), 422);
        assert_eq!(Error::UnprocessableEntity("x".into()).status_code(), 422);
        assert_eq!(Error::Duplicate("x".into()).status_code(), 422);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::MultipleResults("User").status_code(), 500);
        assert_eq!(Error::Database(sqlx::Error::RowNotFound).status_code(), 500);
    }

    #[test]
    fn response_hides_internal_details() {
        let response = Error::Storage("disk on fire".into()).to_response();
        assert_eq!(response.error_code, 500);
        assert_eq!(response.detail, "internal server error");

        let response = Error::NotFound("User id 1".into()).to_response();
        assert_eq!(response.error_code, 404);
        assert_eq!(response.detail, "not found: User id 1");
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        let err = Error::from_database(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Database(_)));
    }
}
