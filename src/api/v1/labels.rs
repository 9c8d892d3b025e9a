//! Label handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::db::{Id, Label};

use super::{db_error, ApiResult, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLabelRequest {
    #[schema(example = "bug")]
    pub name: String,
    #[serde(default = "default_color")]
    #[schema(example = "#d73a4a")]
    pub color: String,
}

fn default_color() -> String {
    "#cccccc".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignLabelRequest {
    pub label_id: Id,
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/labels",
    tag = "labels",
    params(("project" = String, Path, description = "Project ID or name")),
    responses((status = 200, description = "Labels of the project", body = [Label]))
)]
#[instrument(skip(state))]
pub async fn list_project_labels(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<Vec<Label>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let labels = state
        .store
        .list_labels(Some(project.id))
        .await
        .map_err(db_error)?;
    Ok(Json(labels))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project}/labels",
    tag = "labels",
    params(("project" = String, Path, description = "Project ID or name")),
    request_body = CreateLabelRequest,
    responses(
        (status = 201, description = "Label created", body = Label),
        (status = 409, description = "Name already in use", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn create_label(
    State(state): State<AppState>,
    Path(selector): Path<String>,
    Json(req): Json<CreateLabelRequest>,
) -> ApiResult<(StatusCode, Json<Label>)> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let label = state
        .store
        .create_label(project.id, &req.name, &req.color)
        .await
        .map_err(db_error)?;
    Ok((StatusCode::CREATED, Json(label)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/labels",
    tag = "labels",
    params(("id" = i64, Path, description = "Task ID")),
    responses((status = 200, description = "Labels on the task", body = [Label]))
)]
#[instrument(skip(state))]
pub async fn list_task_labels(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<Label>>> {
    let labels = state.store.task_labels(id).await.map_err(db_error)?;
    Ok(Json(labels))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/labels",
    tag = "labels",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = AssignLabelRequest,
    responses(
        (status = 204, description = "Label assigned"),
        (status = 400, description = "Label from another project", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn assign_label(
    State(state): State<AppState>,
    Path(id): Path<Id>,
    Json(req): Json<AssignLabelRequest>,
) -> ApiResult<StatusCode> {
    state
        .store
        .assign_label(id, req.label_id)
        .await
        .map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/labels/{label_id}",
    tag = "labels",
    params(
        ("id" = i64, Path, description = "Task ID"),
        ("label_id" = i64, Path, description = "Label ID")
    ),
    responses(
        (status = 204, description = "Label removed from the task"),
        (status = 404, description = "Assignment not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn unassign_label(
    State(state): State<AppState>,
    Path((id, label_id)): Path<(Id, Id)>,
) -> ApiResult<StatusCode> {
    state
        .store
        .unassign_label(id, label_id)
        .await
        .map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}
