//! Storage-agnostic error types for the store.
//!
//! Uses miette for diagnostic output and thiserror for derive macros. The
//! REST layer maps these to HTTP status codes exactly once (see
//! `api::v1::db_error`).

use miette::Diagnostic;
use thiserror::Error;

/// Database and domain-rule errors.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    #[diagnostic(code(taskgrid::db::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {detail}")]
    #[diagnostic(code(taskgrid::db::already_exists))]
    AlreadyExists { entity: &'static str, detail: String },

    #[error("invalid input: {message}")]
    #[diagnostic(code(taskgrid::db::invalid_input))]
    InvalidInput { message: String },

    #[error("circular dependency: task {task_id} is already reachable from task {depends_on_id}")]
    #[diagnostic(code(taskgrid::db::circular_dependency))]
    CircularDependency { task_id: i64, depends_on_id: i64 },

    #[error("unauthorized")]
    #[diagnostic(code(taskgrid::db::unauthorized))]
    Unauthorized,

    #[error("forbidden: missing scope '{scope}'")]
    #[diagnostic(code(taskgrid::db::forbidden))]
    Forbidden { scope: String },

    #[error("database error: {message}")]
    #[diagnostic(code(taskgrid::db::database))]
    Database { message: String },

    #[error("migration error: {message}")]
    #[diagnostic(code(taskgrid::db::migration))]
    Migration { message: String },

    #[error("connection error: {message}")]
    #[diagnostic(code(taskgrid::db::connection))]
    Connection { message: String },
}

impl DbError {
    pub(crate) fn database(e: impl std::fmt::Display) -> Self {
        DbError::Database {
            message: e.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        DbError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DbError::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
