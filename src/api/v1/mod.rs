//! V1 API handlers.
//!
//! Store errors are mapped to HTTP exactly once, in [`db_error`]; handlers
//! never invent their own status codes for `DbError`.

mod auth;
mod comments;
mod dependencies;
mod epics;
mod labels;
mod projects;
mod search;
mod system;
mod tasks;
mod tokens;

#[cfg(test)]
mod projects_test;
#[cfg(test)]
mod tasks_test;
#[cfg(test)]
mod tokens_test;

pub use auth::*;
pub use comments::*;
pub use dependencies::*;
pub use epics::*;
pub use labels::*;
pub use projects::*;
pub use search::*;
pub use system::*;
pub use tasks::*;
pub use tokens::*;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbError;

/// Uniform error envelope.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "task not found: 42")]
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

/// The one place a `DbError` becomes an HTTP status.
pub(crate) fn db_error(e: DbError) -> ApiError {
    let status = match &e {
        DbError::NotFound { .. } => StatusCode::NOT_FOUND,
        DbError::AlreadyExists { .. } => StatusCode::CONFLICT,
        DbError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        DbError::CircularDependency { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DbError::Unauthorized => StatusCode::UNAUTHORIZED,
        DbError::Forbidden { .. } => StatusCode::FORBIDDEN,
        DbError::Database { .. } | DbError::Migration { .. } | DbError::Connection { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// 400 for malformed request fields (bad enum strings and the like).
pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
