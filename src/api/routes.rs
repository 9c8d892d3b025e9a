//! API route configuration.
//!
//! Everything except health, info and the docs page sits behind the
//! authentication middleware; scope checks happen once in
//! [`crate::auth::authorize`] rather than per route.

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use super::state::AppState;
use super::v1;
use crate::auth;
use crate::db::{
    Activity, ApiToken, Attachment, BoardEntry, Comment, DependencyChains, Epic, Label, Project,
    ProjectGraph, Task, TaskDependency, User,
};
use crate::mcp;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskgrid API",
        version = "0.4.0",
        description = "Headless project management: projects, epics, tasks, dependencies and boards",
        license(name = "MIT")
    ),
    paths(
        v1::health,
        v1::info,
        v1::validate,
        v1::create_token,
        v1::list_tokens,
        v1::get_token,
        v1::revoke_token,
        v1::list_projects,
        v1::create_project,
        v1::get_project,
        v1::update_project,
        v1::delete_project,
        v1::list_project_users,
        v1::get_project_graph,
        v1::list_project_tasks,
        v1::create_project_task,
        v1::get_project_task,
        v1::update_project_task,
        v1::get_board,
        v1::get_board_archived,
        v1::list_tasks,
        v1::create_task,
        v1::get_task,
        v1::update_task,
        v1::delete_task,
        v1::list_dependencies,
        v1::add_dependency,
        v1::remove_dependency,
        v1::get_dependency_chains,
        v1::list_epics,
        v1::create_epic,
        v1::get_epic,
        v1::update_epic,
        v1::delete_epic,
        v1::list_project_labels,
        v1::create_label,
        v1::list_task_labels,
        v1::assign_label,
        v1::unassign_label,
        v1::list_comments,
        v1::add_comment,
        v1::delete_comment,
        v1::search,
    ),
    components(
        schemas(
            v1::HealthResponse,
            v1::InfoResponse,
            v1::ValidateResponse,
            v1::ErrorResponse,
            v1::CreateProjectRequest,
            v1::UpdateProjectRequest,
            v1::CreateTaskRequest,
            v1::UpdateTaskRequest,
            v1::TaskDetailResponse,
            v1::AddDependencyRequest,
            v1::CreateEpicRequest,
            v1::UpdateEpicRequest,
            v1::CreateLabelRequest,
            v1::AssignLabelRequest,
            v1::CreateCommentRequest,
            v1::CreateTokenRequest,
            v1::TokenResponse,
            v1::TokenCreatedResponse,
            v1::SearchResult,
            Project,
            Epic,
            Task,
            TaskDependency,
            DependencyChains,
            ProjectGraph,
            BoardEntry,
            Label,
            Comment,
            Attachment,
            User,
            ApiToken,
            Activity,
        )
    ),
    tags(
        (name = "system", description = "Health and build info"),
        (name = "auth", description = "Token validation"),
        (name = "tokens", description = "API token administration"),
        (name = "projects", description = "Project management"),
        (name = "epics", description = "Epic management"),
        (name = "tasks", description = "Task management"),
        (name = "board", description = "Dependency-aware board views"),
        (name = "dependencies", description = "Task dependency graph"),
        (name = "labels", description = "Labels"),
        (name = "comments", description = "Task comments"),
        (name = "search", description = "Semantic and text search"),
    )
)]
pub struct ApiDoc;

/// Create the full router: public surface plus the authenticated API.
pub fn create_router(state: AppState) -> Router {
    let api = ApiDoc::openapi();

    let public = Router::new()
        .route("/health", get(v1::health))
        .route("/info", get(v1::info))
        .merge(Scalar::with_url("/docs", api));

    let authed = Router::new()
        .route("/auth/validate", get(v1::validate))
        .route("/admin/tokens", post(v1::create_token).get(v1::list_tokens))
        .route(
            "/admin/tokens/{id}",
            get(v1::get_token).delete(v1::revoke_token),
        )
        .route(
            "/api/projects",
            get(v1::list_projects).post(v1::create_project),
        )
        .route(
            "/api/projects/{project}",
            get(v1::get_project)
                .put(v1::update_project)
                .delete(v1::delete_project),
        )
        .route("/api/projects/{project}/users", get(v1::list_project_users))
        .route("/api/projects/{project}/graph", get(v1::get_project_graph))
        .route(
            "/api/projects/{project}/tasks",
            get(v1::list_project_tasks).post(v1::create_project_task),
        )
        .route(
            "/api/projects/{project}/tasks/{task_id}",
            get(v1::get_project_task).put(v1::update_project_task),
        )
        .route("/api/projects/{project}/board", get(v1::get_board))
        .route(
            "/api/projects/{project}/board/archived",
            get(v1::get_board_archived),
        )
        .route(
            "/api/projects/{project}/epics",
            get(v1::list_epics).post(v1::create_epic),
        )
        .route(
            "/api/projects/{project}/epics/{id}",
            get(v1::get_epic).put(v1::update_epic).delete(v1::delete_epic),
        )
        .route(
            "/api/projects/{project}/labels",
            get(v1::list_project_labels).post(v1::create_label),
        )
        .route("/api/tasks", get(v1::list_tasks).post(v1::create_task))
        .route(
            "/api/tasks/{id}",
            get(v1::get_task).put(v1::update_task).delete(v1::delete_task),
        )
        .route(
            "/api/tasks/{id}/dependencies",
            get(v1::list_dependencies).post(v1::add_dependency),
        )
        .route(
            "/api/tasks/{id}/dependencies/chain",
            get(v1::get_dependency_chains),
        )
        .route(
            "/api/tasks/{id}/dependencies/{dep_id}",
            delete(v1::remove_dependency),
        )
        .route(
            "/api/tasks/{id}/labels",
            get(v1::list_task_labels).post(v1::assign_label),
        )
        .route("/api/tasks/{id}/labels/{label_id}", delete(v1::unassign_label))
        .route(
            "/api/tasks/{id}/comments",
            get(v1::list_comments).post(v1::add_comment),
        )
        .route("/api/comments/{id}", delete(v1::delete_comment))
        .route("/api/search", get(v1::search))
        .route("/mcp", post(mcp::rpc))
        .route("/mcp/tools", get(mcp::mirror_list_tools))
        .route("/mcp/tools/call", post(mcp::mirror_call_tool))
        .route("/mcp/resources", get(mcp::mirror_list_resources))
        .route("/mcp/resources/get", get(mcp::mirror_get_resource))
        .layer(middleware::from_fn(auth::authorize))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    public
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
