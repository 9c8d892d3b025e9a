//! Admin token management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::auth::{generate_token, hash_token, AuthContext};
use crate::db::{ApiToken, Id};

use super::{db_error, ApiResult, ErrorResponse};

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub id: Id,
    pub user_id: Id,
    #[schema(example = "ci-pipeline")]
    pub name: String,
    pub description: String,
    #[schema(example = "read,write")]
    pub scopes: String,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<ApiToken> for TokenResponse {
    fn from(t: ApiToken) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            name: t.name,
            description: t.description,
            scopes: t.scopes,
            expires_at: t.expires_at.map(|d| d.to_rfc3339()),
            last_used_at: t.last_used_at.map(|d| d.to_rfc3339()),
            is_active: t.is_active,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

/// Creation response; the only place the plaintext ever appears.
#[derive(Serialize, ToSchema)]
pub struct TokenCreatedResponse {
    /// Plaintext token. Shown once, never stored.
    pub token: String,
    #[serde(flatten)]
    pub details: TokenResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTokenRequest {
    #[schema(example = "ci-pipeline")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Comma-separated scopes; defaults to "read,write".
    pub scopes: Option<String>,
    pub expires_in_days: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/admin/tokens",
    tag = "tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token created; plaintext returned once", body = TokenCreatedResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateTokenRequest>,
) -> ApiResult<(StatusCode, Json<TokenCreatedResponse>)> {
    let plaintext = generate_token();
    let expires_at = req
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(days));

    let token = state
        .store
        .create_token(
            ctx.user_id,
            &req.name,
            &req.description,
            &hash_token(&plaintext),
            req.scopes.as_deref().unwrap_or("read,write"),
            expires_at,
        )
        .await
        .map_err(db_error)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenCreatedResponse {
            token: plaintext,
            details: token.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/tokens",
    tag = "tokens",
    responses((status = 200, description = "All tokens, hashes omitted", body = [TokenResponse]))
)]
#[instrument(skip(state))]
pub async fn list_tokens(State(state): State<AppState>) -> ApiResult<Json<Vec<TokenResponse>>> {
    let tokens = state.store.list_tokens().await.map_err(db_error)?;
    Ok(Json(tokens.into_iter().map(TokenResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/admin/tokens/{id}",
    tag = "tokens",
    params(("id" = i64, Path, description = "Token ID")),
    responses(
        (status = 200, description = "Token found", body = TokenResponse),
        (status = 404, description = "Token not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_token(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<TokenResponse>> {
    let token = state.store.get_token(id).await.map_err(db_error)?;
    Ok(Json(token.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/tokens/{id}",
    tag = "tokens",
    params(("id" = i64, Path, description = "Token ID")),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 404, description = "Token not found", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    state.store.revoke_token(id).await.map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}
