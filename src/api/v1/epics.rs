//! Epic handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::str::FromStr;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::auth::AuthContext;
use crate::db::{Epic, EpicStatus, Id};

use super::{bad_request, db_error, ApiResult, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEpicRequest {
    #[schema(example = "Q3 checkout revamp")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// planned, active, completed, cancelled; defaults to planned.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEpicRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListEpicsQuery {
    /// Filter by status
    #[param(example = "active")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteEpicQuery {
    /// Also delete the epic's tasks instead of detaching them.
    #[serde(default)]
    pub cascade: bool,
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/epics",
    tag = "epics",
    params(("project" = String, Path, description = "Project ID or name"), ListEpicsQuery),
    responses((status = 200, description = "Epics with derived progress", body = [Epic]))
)]
#[instrument(skip(state))]
pub async fn list_epics(
    State(state): State<AppState>,
    Path(selector): Path<String>,
    Query(query): Query<ListEpicsQuery>,
) -> ApiResult<Json<Vec<Epic>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let status = query
        .status
        .as_deref()
        .map(EpicStatus::from_str)
        .transpose()
        .map_err(bad_request)?;
    let epics = state
        .store
        .list_epics(Some(project.id), status)
        .await
        .map_err(db_error)?;
    Ok(Json(epics))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project}/epics",
    tag = "epics",
    params(("project" = String, Path, description = "Project ID or name")),
    request_body = CreateEpicRequest,
    responses(
        (status = 201, description = "Epic created", body = Epic),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_epic(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(selector): Path<String>,
    Json(req): Json<CreateEpicRequest>,
) -> ApiResult<(StatusCode, Json<Epic>)> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let status = req
        .status
        .as_deref()
        .map(EpicStatus::from_str)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or_default();

    let epic = state
        .store
        .create_epic(project.id, &req.name, &req.description, status, ctx.user_id)
        .await
        .map_err(db_error)?;
    Ok((StatusCode::CREATED, Json(epic)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/epics/{id}",
    tag = "epics",
    params(
        ("project" = String, Path, description = "Project ID or name"),
        ("id" = i64, Path, description = "Epic ID")
    ),
    responses(
        (status = 200, description = "Epic found", body = Epic),
        (status = 404, description = "Epic not found in this project", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_epic(
    State(state): State<AppState>,
    Path((selector, id)): Path<(String, Id)>,
) -> ApiResult<Json<Epic>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let epic = state.store.get_epic(id).await.map_err(db_error)?;
    if epic.project_id != project.id {
        return Err(db_error(crate::db::DbError::NotFound {
            entity: "epic",
            id: id.to_string(),
        }));
    }
    Ok(Json(epic))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project}/epics/{id}",
    tag = "epics",
    params(
        ("project" = String, Path, description = "Project ID or name"),
        ("id" = i64, Path, description = "Epic ID")
    ),
    request_body = UpdateEpicRequest,
    responses(
        (status = 200, description = "Epic updated", body = Epic),
        (status = 404, description = "Epic not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn update_epic(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((selector, id)): Path<(String, Id)>,
    Json(req): Json<UpdateEpicRequest>,
) -> ApiResult<Json<Epic>> {
    state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let status = req
        .status
        .as_deref()
        .map(EpicStatus::from_str)
        .transpose()
        .map_err(bad_request)?;
    let epic = state
        .store
        .update_epic(id, req.name, req.description, status, ctx.user_id)
        .await
        .map_err(db_error)?;
    Ok(Json(epic))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project}/epics/{id}",
    tag = "epics",
    params(
        ("project" = String, Path, description = "Project ID or name"),
        ("id" = i64, Path, description = "Epic ID"),
        DeleteEpicQuery
    ),
    responses(
        (status = 204, description = "Epic deleted; tasks detached, or removed with cascade=true"),
        (status = 404, description = "Epic not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_epic(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((selector, id)): Path<(String, Id)>,
    Query(query): Query<DeleteEpicQuery>,
) -> ApiResult<StatusCode> {
    state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let paths = state
        .store
        .delete_epic(id, query.cascade, ctx.user_id)
        .await
        .map_err(db_error)?;
    super::projects::remove_attachment_blobs(&state, &paths);
    Ok(StatusCode::NO_CONTENT)
}
