//! Task handlers: project-scoped routes, the legacy flat mirrors, and the
//! board views.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::auth::AuthContext;
use crate::board;
use crate::db::{
    BoardEntry, EntityKind, Id, NewTask, Priority, Task, TaskDependency, TaskFilter, TaskPatch,
    TaskStatus,
};

use super::projects::remove_attachment_blobs;
use super::{bad_request, db_error, ApiResult, ErrorResponse};

// =============================================================================
// DTOs
// =============================================================================

/// A task plus its startability, for single-task reads.
#[derive(serde::Serialize, ToSchema)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    /// Whether every immediate predecessor is satisfied.
    pub can_start: bool,
    /// The unsatisfied predecessor edges, empty when startable.
    pub unmet_dependencies: Vec<TaskDependency>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    #[schema(example = "Wire up the login endpoint")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// todo, in_progress, review, done, cancelled; defaults to todo.
    pub status: Option<String>,
    /// low, medium, high, urgent; defaults to medium.
    pub priority: Option<String>,
    pub parent_id: Option<Id>,
    pub epic_id: Option<Id>,
    pub assignee_id: Option<Id>,
    pub due_date: Option<DateTime<Utc>>,
    /// Required on the flat route; ignored on the project-scoped one.
    pub project_id: Option<Id>,
}

/// Partial update. Nullable-field members use double options so an explicit
/// `null` clears while an absent key leaves the value alone.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub assignee_id: Option<Option<Id>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub epic_id: Option<Option<Id>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub parent_id: Option<Option<Id>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Deserialize a maybe-absent, maybe-null field as Option<Option<T>>.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTasksQuery {
    /// Filter by status
    #[param(example = "in_progress")]
    pub status: Option<String>,
    pub epic_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub assignee_id: Option<Id>,
    /// Required on the flat route unless other filters narrow the set
    pub project_id: Option<Id>,
    #[param(example = 50)]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl UpdateTaskRequest {
    fn into_patch(self) -> Result<TaskPatch, String> {
        Ok(TaskPatch {
            title: self.title,
            description: self.description,
            status: self.status.as_deref().map(TaskStatus::from_str).transpose()?,
            priority: self.priority.as_deref().map(Priority::from_str).transpose()?,
            assignee_id: self.assignee_id,
            epic_id: self.epic_id,
            parent_id: self.parent_id,
            due_date: self.due_date,
        })
    }
}

impl ListTasksQuery {
    fn into_filter(self, project_id: Option<Id>) -> Result<TaskFilter, String> {
        Ok(TaskFilter {
            project_id: project_id.or(self.project_id),
            epic_id: self.epic_id,
            parent_id: self.parent_id,
            status: self.status.as_deref().map(TaskStatus::from_str).transpose()?,
            assignee_id: self.assignee_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn parse_new_task(req: CreateTaskRequest, project_id: Id) -> Result<NewTask, String> {
    Ok(NewTask {
        project_id,
        parent_id: req.parent_id,
        epic_id: req.epic_id,
        title: req.title,
        description: req.description,
        status: req.status.as_deref().map(TaskStatus::from_str).transpose()?.unwrap_or_default(),
        priority: req.priority.as_deref().map(Priority::from_str).transpose()?.unwrap_or_default(),
        assignee_id: req.assignee_id,
        due_date: req.due_date,
    })
}

async fn task_detail(state: &AppState, task: Task) -> ApiResult<TaskDetailResponse> {
    let (can_start, unmet) = state.store.can_start(task.id).await.map_err(db_error)?;
    Ok(TaskDetailResponse {
        task,
        can_start,
        unmet_dependencies: unmet,
    })
}

// =============================================================================
// Project-scoped handlers
// =============================================================================

#[utoipa::path(
    get,
    path = "/api/projects/{project}/tasks",
    tag = "tasks",
    params(("project" = String, Path, description = "Project ID or name"), ListTasksQuery),
    responses((status = 200, description = "Tasks of the project", body = [Task]))
)]
#[instrument(skip(state))]
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(selector): Path<String>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let filter = query.into_filter(Some(project.id)).map_err(bad_request)?;
    let tasks = state.store.list_tasks(&filter).await.map_err(db_error)?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/api/projects/{project}/tasks",
    tag = "tasks",
    params(("project" = String, Path, description = "Project ID or name")),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_project_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(selector): Path<String>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let input = parse_new_task(req, project.id).map_err(bad_request)?;
    let task = state
        .store
        .create_task(&input, ctx.user_id)
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Task, task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/tasks/{task_id}",
    tag = "tasks",
    params(
        ("project" = String, Path, description = "Project ID or name"),
        ("task_id" = i64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task with startability", body = TaskDetailResponse),
        (status = 404, description = "Task not found in this project", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_project_task(
    State(state): State<AppState>,
    Path((selector, task_id)): Path<(String, Id)>,
) -> ApiResult<Json<TaskDetailResponse>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let task = state.store.get_task(task_id).await.map_err(db_error)?;
    if task.project_id != project.id {
        return Err(db_error(crate::db::DbError::NotFound {
            entity: "task",
            id: task_id.to_string(),
        }));
    }
    Ok(Json(task_detail(&state, task).await?))
}

#[utoipa::path(
    put,
    path = "/api/projects/{project}/tasks/{task_id}",
    tag = "tasks",
    params(
        ("project" = String, Path, description = "Project ID or name"),
        ("task_id" = i64, Path, description = "Task ID")
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn update_project_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((selector, task_id)): Path<(String, Id)>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let existing = state.store.get_task(task_id).await.map_err(db_error)?;
    if existing.project_id != project.id {
        return Err(db_error(crate::db::DbError::NotFound {
            entity: "task",
            id: task_id.to_string(),
        }));
    }

    let patch = req.into_patch().map_err(bad_request)?;
    let task = state
        .store
        .update_task(task_id, &patch, ctx.user_id)
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Task, task.id);
    Ok(Json(task))
}

// =============================================================================
// Board
// =============================================================================

#[utoipa::path(
    get,
    path = "/api/projects/{project}/board",
    tag = "board",
    params(("project" = String, Path, description = "Project ID or name")),
    responses((status = 200, description = "Board-ordered tasks", body = [BoardEntry]))
)]
#[instrument(skip(state))]
pub async fn get_board(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<Vec<BoardEntry>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let entries = state
        .store
        .board_entries(project.id)
        .await
        .map_err(db_error)?;
    let (active, _) = board::organize(entries, Utc::now());
    Ok(Json(active))
}

#[utoipa::path(
    get,
    path = "/api/projects/{project}/board/archived",
    tag = "board",
    params(("project" = String, Path, description = "Project ID or name")),
    responses((status = 200, description = "Tasks aged off the board", body = [BoardEntry]))
)]
#[instrument(skip(state))]
pub async fn get_board_archived(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> ApiResult<Json<Vec<BoardEntry>>> {
    let project = state
        .store
        .resolve_project(&selector)
        .await
        .map_err(db_error)?;
    let entries = state
        .store
        .board_entries(project.id)
        .await
        .map_err(db_error)?;
    let (_, archived) = board::organize(entries, Utc::now());
    Ok(Json(archived))
}

// =============================================================================
// Legacy flat mirrors
// =============================================================================

#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "tasks",
    params(ListTasksQuery),
    responses((status = 200, description = "Tasks across projects", body = [Task]))
)]
#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = query.into_filter(None).map_err(bad_request)?;
    let tasks = state.store.list_tasks(&filter).await.map_err(db_error)?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Missing project_id", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let project_id = req
        .project_id
        .ok_or_else(|| bad_request("project_id is required"))?;
    let input = parse_new_task(req, project_id).map_err(bad_request)?;
    let task = state
        .store
        .create_task(&input, ctx.user_id)
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Task, task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with startability", body = TaskDetailResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<TaskDetailResponse>> {
    let task = state.store.get_task(id).await.map_err(db_error)?;
    Ok(Json(task_detail(&state, task).await?))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Id>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let patch = req.into_patch().map_err(bad_request)?;
    let task = state
        .store
        .update_task(id, &patch, ctx.user_id)
        .await
        .map_err(db_error)?;

    state.embed.queue_job(EntityKind::Task, task.id);
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    tag = "tasks",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task and subtasks deleted"),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    let paths = state
        .store
        .delete_task(id, ctx.user_id)
        .await
        .map_err(db_error)?;
    remove_attachment_blobs(&state, &paths);
    Ok(StatusCode::NO_CONTENT)
}
