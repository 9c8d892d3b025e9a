//! API-token authentication.
//!
//! Tokens are 32 random bytes rendered as 64 hex chars; only the sha256 of
//! the plaintext is stored. Requests present the plaintext as a Bearer
//! header or `X-API-Key`. An optional static admin token from config grants
//! every scope; it is compared by digest, never byte-by-byte on the
//! plaintext.

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::AppState;
use crate::db::{Id, SYSTEM_ACTOR};

/// Authenticated caller, attached to the request as an extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Database token id; None for the static admin token.
    pub token_id: Option<Id>,
    pub user_id: Id,
    pub scopes: String,
    pub is_admin: bool,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.is_admin
            || self
                .scopes
                .split(',')
                .map(str::trim)
                .any(|s| s == "*" || s == scope)
    }
}

/// Generate a fresh plaintext token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex(&bytes)
}

/// Hex sha256 of a plaintext token; the only form that is ever stored.
pub fn hash_token(plaintext: &str) -> String {
    hex(&Sha256::digest(plaintext.as_bytes()))
}

/// Compare a presented token against the configured admin token by digest,
/// so the comparison does not leak a prefix-match timing signal.
fn admin_matches(presented: &str, configured: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(configured.as_bytes())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}

fn presented_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Authentication middleware. Rejects with 401 unless the request carries a
/// valid token; otherwise attaches an [`AuthContext`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(plaintext) = presented_token(&request) else {
        return unauthorized("missing API token");
    };

    if let Some(admin_token) = &state.config.admin_api_token {
        if admin_matches(&plaintext, admin_token) {
            request.extensions_mut().insert(AuthContext {
                token_id: None,
                user_id: SYSTEM_ACTOR,
                scopes: "*".to_string(),
                is_admin: true,
            });
            return next.run(request).await;
        }
    }

    let token = match state.store.find_token_by_hash(&hash_token(&plaintext)).await {
        Ok(Some(token)) => token,
        Ok(None) => return unauthorized("invalid API token"),
        Err(e) => {
            debug!(error = %e, "token lookup failed");
            return unauthorized("invalid API token");
        }
    };

    if !token.is_active {
        return unauthorized("token revoked");
    }
    if let Some(expires_at) = token.expires_at {
        if expires_at <= Utc::now() {
            return unauthorized("token expired");
        }
    }

    // Usage stamp is best effort; never on the critical path.
    let store = state.store.clone();
    let token_id = token.id;
    tokio::spawn(async move {
        if let Err(e) = store.touch_token(token_id).await {
            debug!(token_id, error = %e, "cannot stamp token usage");
        }
    });

    request.extensions_mut().insert(AuthContext {
        token_id: Some(token.id),
        user_id: token.user_id,
        scopes: token.scopes.clone(),
        is_admin: token.has_scope("admin"),
    });
    next.run(request).await
}

/// Maps a request to the scope it needs and delegates to the matching gate.
/// Layered once over the whole authenticated router, so route registration
/// stays flat.
pub async fn authorize(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if path.starts_with("/admin/") {
        return require_admin(request, next).await;
    }
    // Validation only proves the token itself; any authenticated caller may
    // introspect their own credentials.
    if path == "/auth/validate" {
        return next.run(request).await;
    }
    match *request.method() {
        Method::GET | Method::HEAD | Method::OPTIONS => require_scope("read", request, next).await,
        _ => require_scope("write", request, next).await,
    }
}

/// Scope gate, layered inside [`authenticate`].
pub async fn require_scope(scope: &'static str, request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthContext>() {
        Some(ctx) if ctx.has_scope(scope) => next.run(request).await,
        Some(_) => forbidden(&format!("missing scope '{}'", scope)),
        None => unauthorized("missing API token"),
    }
}

/// Admin gate for token management routes.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthContext>() {
        Some(ctx) if ctx.is_admin => next.run(request).await,
        Some(_) => forbidden("admin access required"),
        None => unauthorized("missing API token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_and_not_the_plaintext() {
        let token = "a".repeat(64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(hash_token(&token).len(), 64);
    }

    #[test]
    fn admin_compare_is_exact() {
        assert!(admin_matches("secret", "secret"));
        assert!(!admin_matches("secret", "secret2"));
        assert!(!admin_matches("", "secret"));
    }

    #[test]
    fn context_scopes_follow_token_rules() {
        let ctx = AuthContext {
            token_id: Some(1),
            user_id: 1,
            scopes: "read".into(),
            is_admin: false,
        };
        assert!(ctx.has_scope("read"));
        assert!(!ctx.has_scope("write"));

        let admin = AuthContext {
            token_id: None,
            user_id: 0,
            scopes: "*".into(),
            is_admin: true,
        };
        assert!(admin.has_scope("anything"));
    }
}
