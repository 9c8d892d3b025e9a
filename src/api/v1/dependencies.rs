//! Task dependency handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::db::{DependencyChains, DependencyKind, Id, TaskDependency};

use super::{bad_request, db_error, ApiResult, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddDependencyRequest {
    /// The task this one will be blocked by.
    pub depends_on_id: Id,
    /// finish_to_start (default) or start_to_start.
    pub kind: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/dependencies",
    tag = "dependencies",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Immediate predecessor edges", body = [TaskDependency]),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_dependencies(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<TaskDependency>>> {
    let edges = state.store.list_dependencies(id).await.map_err(db_error)?;
    Ok(Json(edges))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/dependencies",
    tag = "dependencies",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = AddDependencyRequest,
    responses(
        (status = 201, description = "Edge added", body = TaskDependency),
        (status = 400, description = "Self-dependency or cross-project edge", body = ErrorResponse),
        (status = 409, description = "Edge already exists", body = ErrorResponse),
        (status = 422, description = "Edge would close a cycle", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn add_dependency(
    State(state): State<AppState>,
    Path(id): Path<Id>,
    Json(req): Json<AddDependencyRequest>,
) -> ApiResult<(StatusCode, Json<TaskDependency>)> {
    let kind = req
        .kind
        .as_deref()
        .map(DependencyKind::from_str)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or_default();

    let edge = state
        .store
        .add_dependency(id, req.depends_on_id, kind)
        .await
        .map_err(db_error)?;
    Ok((StatusCode::CREATED, Json(edge)))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/dependencies/{dep_id}",
    tag = "dependencies",
    params(
        ("id" = i64, Path, description = "Task ID"),
        ("dep_id" = i64, Path, description = "The depends-on task ID")
    ),
    responses(
        (status = 204, description = "Edge removed; removing an absent edge is a no-op"),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn remove_dependency(
    State(state): State<AppState>,
    Path((id, dep_id)): Path<(Id, Id)>,
) -> ApiResult<StatusCode> {
    state
        .store
        .remove_dependency(id, dep_id)
        .await
        .map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/dependencies/chain",
    tag = "dependencies",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Transitive predecessors and dependents", body = DependencyChains),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_dependency_chains(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<DependencyChains>> {
    let chains = state.store.dependency_chains(id).await.map_err(db_error)?;
    Ok(Json(chains))
}
