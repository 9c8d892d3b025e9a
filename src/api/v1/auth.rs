//! Token self-inspection.

use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthContext;
use crate::db::Id;

#[derive(Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: Id,
    #[schema(example = "read,write")]
    pub scopes: String,
    pub is_admin: bool,
}

#[utoipa::path(
    get,
    path = "/auth/validate",
    tag = "auth",
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "Missing or invalid token", body = super::ErrorResponse)
    )
)]
pub async fn validate(Extension(ctx): Extension<AuthContext>) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        valid: true,
        user_id: ctx.user_id,
        scopes: ctx.scopes,
        is_admin: ctx.is_admin,
    })
}
