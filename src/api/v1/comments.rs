//! Comment handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::auth::AuthContext;
use crate::db::{Comment, EntityKind, Id, SYSTEM_ACTOR};

use super::{db_error, ApiResult, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    #[schema(example = "Blocked on the schema migration.")]
    pub body: String,
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/comments",
    tag = "comments",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<Comment>>> {
    let comments = state.store.list_comments(id).await.map_err(db_error)?;
    Ok(Json(comments))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/comments",
    tag = "comments",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Empty body", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Id>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    // The static admin token has no user row behind it.
    let author = (ctx.user_id != SYSTEM_ACTOR).then_some(ctx.user_id);
    let comment = state
        .store
        .add_comment(id, author, &req.body, ctx.user_id)
        .await
        .map_err(db_error)?;

    // Comment text feeds the task's embedding.
    state.embed.queue_job(EntityKind::Task, id);
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 404, description = "Comment not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    state.store.delete_comment(id).await.map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}
