//! Integration tests for token administration and the auth lifecycle.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::embedding::{EmbedWorker, EmbeddingProvider, LocalProvider};

const ADMIN_TOKEN: &str = "test-admin-token";

async fn test_app() -> axum::Router {
    let store = SqliteStore::in_memory().await.expect("in-memory store");
    store.migrate().await.expect("migrations");
    let config = Arc::new(Config {
        admin_api_token: Some(ADMIN_TOKEN.to_string()),
        ..Config::default()
    });
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(LocalProvider::new(16));
    let (_worker, embed) =
        EmbedWorker::new(store.clone(), provider.clone(), CancellationToken::new());
    create_router(AppState::new(store, config, embed, provider))
}

async fn send_as(
    app: &axum::Router,
    token: &str,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn mint(app: &axum::Router, body: Value) -> Value {
    let response = send_as(app, ADMIN_TOKEN, "POST", "/admin/tokens", Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test(flavor = "multi_thread")]
async fn create_use_then_revoke() {
    let app = test_app().await;

    let created = mint(&app, json!({"name": "ci"})).await;
    let plaintext = created["token"].as_str().unwrap().to_string();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["scopes"], "read,write");
    assert_eq!(plaintext.len(), 64);

    let ok = send_as(&app, &plaintext, "GET", "/api/projects", None).await;
    assert_eq!(ok.status(), StatusCode::OK);

    let revoked = send_as(
        &app,
        ADMIN_TOKEN,
        "DELETE",
        &format!("/admin/tokens/{}", id),
        None,
    )
    .await;
    assert_eq!(revoked.status(), StatusCode::NO_CONTENT);

    let rejected = send_as(&app, &plaintext, "GET", "/api/projects", None).await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    // The row survives revocation for auditing.
    let listed = json_body(send_as(&app, ADMIN_TOKEN, "GET", "/admin/tokens", None).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["is_active"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn plaintext_never_reappears() {
    let app = test_app().await;
    let created = mint(&app, json!({"name": "ci"})).await;
    let plaintext = created["token"].as_str().unwrap();
    let id = created["id"].as_i64().unwrap();

    let fetched = json_body(
        send_as(
            &app,
            ADMIN_TOKEN,
            "GET",
            &format!("/admin/tokens/{}", id),
            None,
        )
        .await,
    )
    .await;
    assert!(fetched.get("token").is_none());
    assert!(fetched.get("token_hash").is_none());
    assert!(!fetched.to_string().contains(plaintext));
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_tokens_are_rejected() {
    let app = test_app().await;
    let created = mint(&app, json!({"name": "stale", "expires_in_days": -1})).await;
    let plaintext = created["token"].as_str().unwrap().to_string();

    let response = send_as(&app, &plaintext, "GET", "/api/projects", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn token_administration_is_admin_only() {
    let app = test_app().await;
    let created = mint(&app, json!({"name": "ci"})).await;
    let plaintext = created["token"].as_str().unwrap().to_string();

    let response = send_as(
        &app,
        &plaintext,
        "POST",
        "/admin/tokens",
        Some(json!({"name": "escalation"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let listing = send_as(&app, &plaintext, "GET", "/admin/tokens", None).await;
    assert_eq!(listing.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_reports_the_caller() {
    let app = test_app().await;

    let admin = json_body(send_as(&app, ADMIN_TOKEN, "GET", "/auth/validate", None).await).await;
    assert_eq!(admin["valid"], true);
    assert_eq!(admin["is_admin"], true);

    let created = mint(&app, json!({"name": "ci", "scopes": "read"})).await;
    let plaintext = created["token"].as_str().unwrap().to_string();
    let caller = json_body(send_as(&app, &plaintext, "GET", "/auth/validate", None).await).await;
    assert_eq!(caller["valid"], true);
    assert_eq!(caller["is_admin"], false);
    assert_eq!(caller["scopes"], "read");
}

#[tokio::test(flavor = "multi_thread")]
async fn x_api_key_header_is_accepted() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/projects")
                .header("x-api-key", ADMIN_TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
