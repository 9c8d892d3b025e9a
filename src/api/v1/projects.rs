//! Project handlers. `{project}` path segments accept an id or a unique
//! name among non-archived projects.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::auth::AuthContext;
use crate::db::{EntityKind, NewProject, Project, ProjectGraph, ProjectStatus, User};

use super::{bad_request, db_error, ApiResult, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[schema(example = "website-redesign")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// active, draft or archived; defaults to active.
    pub status: Option<String>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProjectsQuery {
    /// Filter by status (active, archived, draft)
    #[param(example = "active")]
    pub status: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "projects",
    params(ListProjectsQuery),
    responses((status = 200, description = "Projects", body = [Project]))
)]
#[instrument(skip(state))]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    let status = query
        .status
        .as_deref()
        .map(ProjectStatus::from_str)
        .transpose()
        .map_err(bad_request)?;
    let projects = state.store.list_projects(status).await.map_err(db_error)?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 409, description = "Name already in use", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let status = req
        .status
        .as_deref()
        .map(ProjectStatus::from_str)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or_default();

    let project = state
        .store
        .create_project(
            &NewProject {
                name: req.name,
                description: req.description,
                status,
                owner_id: req.owner_id,
            },
            ctx.user_id,
        )
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Project, project.id);
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}",
    tag = "projects",
    params(("project" = String, Path, description = "Project ID or name")),
    responses(
        (status = 200, description = "Project found", body = Project),
        (status = 404, description = "Project not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<Project>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project}",
    tag = "projects",
    params(("project" = String, Path, description = "Project ID or name")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 409, description = "Name already in use", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(selector): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let status = req
        .status
        .as_deref()
        .map(ProjectStatus::from_str)
        .transpose()
        .map_err(bad_request)?;

    let project = state
        .store
        .update_project(project.id, req.name, req.description, status, ctx.user_id)
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Project, project.id);
    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{project}",
    tag = "projects",
    params(("project" = String, Path, description = "Project ID or name")),
    responses(
        (status = 204, description = "Project and all owned entities deleted"),
        (status = 404, description = "Project not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(selector): Path<String>,
) -> ApiResult<StatusCode> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let paths = state
        .store
        .delete_project(project.id, ctx.user_id)
        .await
        .map_err(db_error)?;

    remove_attachment_blobs(&state, &paths);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/users",
    tag = "projects",
    params(("project" = String, Path, description = "Project ID or name")),
    responses((status = 200, description = "Members, owner and assignees", body = [User]))
)]
#[instrument(skip(state))]
pub async fn list_project_users(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<Vec<User>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let users = state
        .store
        .project_users(project.id)
        .await
        .map_err(db_error)?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/graph",
    tag = "projects",
    params(("project" = String, Path, description = "Project ID or name")),
    responses((status = 200, description = "Tasks and dependency edges", body = ProjectGraph))
)]
#[instrument(skip(state))]
pub async fn get_project_graph(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<ProjectGraph>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let graph = state
        .store
        .project_graph(project.id)
        .await
        .map_err(db_error)?;
    Ok(Json(graph))
}

/// Best-effort blob cleanup after a cascade delete; the rows are already
/// gone, so failures only leak disk space.
pub(crate) fn remove_attachment_blobs(state: &AppState, paths: &[String]) {
    for path in paths {
        let full = state.config.storage.upload_dir.join(path);
        if let Err(e) = std::fs::remove_file(&full) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %full.display(), error = %e, "cannot remove attachment blob");
            }
        }
    }
}
