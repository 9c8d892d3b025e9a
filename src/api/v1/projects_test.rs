//! Integration tests for project endpoints and the auth gate in front of
//! them.

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

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> axum::response::Response {
    send_as(app, ADMIN_TOKEN, method, uri, body).await
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

#[tokio::test(flavor = "multi_thread")]
async fn create_and_fetch_project_by_id_or_name() {
    let app = test_app().await;

    let response = send(
        &app,
        "POST",
        "/api/projects",
        Some(json!({"name": "atlas", "description": "mapping service"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["status"], "active");

    let by_id = send(&app, "GET", &format!("/api/projects/{}", id), None).await;
    assert_eq!(by_id.status(), StatusCode::OK);

    let by_name = send(&app, "GET", "/api/projects/atlas", None).await;
    assert_eq!(by_name.status(), StatusCode::OK);
    assert_eq!(json_body(by_name).await["id"], id);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_name_conflicts_until_archived() {
    let app = test_app().await;

    send(&app, "POST", "/api/projects", Some(json!({"name": "atlas"}))).await;
    let duplicate = send(&app, "POST", "/api/projects", Some(json!({"name": "atlas"}))).await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    let body = json_body(duplicate).await;
    assert!(body["error"].as_str().unwrap().contains("atlas"));

    let archived = send(
        &app,
        "PUT",
        "/api/projects/atlas",
        Some(json!({"status": "archived"})),
    )
    .await;
    assert_eq!(archived.status(), StatusCode::OK);

    // The name is free again once the holder is archived.
    let reuse = send(&app, "POST", "/api/projects", Some(json!({"name": "atlas"}))).await;
    assert_eq!(reuse.status(), StatusCode::CREATED);
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_without_a_token_are_rejected() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/projects")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body["error"].is_string());

    // Health stays open.
    let health = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn read_scope_cannot_mutate() {
    let app = test_app().await;

    let created = send(
        &app,
        "POST",
        "/admin/tokens",
        Some(json!({"name": "reader", "scopes": "read"})),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let reader = json_body(created).await["token"].as_str().unwrap().to_string();

    let list = send_as(&app, &reader, "GET", "/api/projects", None).await;
    assert_eq!(list.status(), StatusCode::OK);

    let create = send_as(
        &app,
        &reader,
        "POST",
        "/api/projects",
        Some(json!({"name": "atlas"})),
    )
    .await;
    assert_eq!(create.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_changes_only_sent_fields() {
    let app = test_app().await;
    send(
        &app,
        "POST",
        "/api/projects",
        Some(json!({"name": "atlas", "description": "v1"})),
    )
    .await;

    let response = send(
        &app,
        "PUT",
        "/api/projects/atlas",
        Some(json!({"description": "v2"})),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["name"], "atlas");
    assert_eq!(body["description"], "v2");
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_project_cascades_to_tasks() {
    let app = test_app().await;
    send(&app, "POST", "/api/projects", Some(json!({"name": "atlas"}))).await;
    let task = json_body(
        send(
            &app,
            "POST",
            "/api/projects/atlas/tasks",
            Some(json!({"title": "first"})),
        )
        .await,
    )
    .await;
    let task_id = task["id"].as_i64().unwrap();

    let deleted = send(&app, "DELETE", "/api/projects/atlas", None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = send(&app, "GET", &format!("/api/tasks/{}", task_id), None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    let project_gone = send(&app, "GET", "/api/projects/atlas", None).await;
    assert_eq!(project_gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn graph_reports_nodes_and_edges() {
    let app = test_app().await;
    send(&app, "POST", "/api/projects", Some(json!({"name": "atlas"}))).await;
    let a = json_body(
        send(
            &app,
            "POST",
            "/api/projects/atlas/tasks",
            Some(json!({"title": "a"})),
        )
        .await,
    )
    .await["id"]
        .as_i64()
        .unwrap();
    let b = json_body(
        send(
            &app,
            "POST",
            "/api/projects/atlas/tasks",
            Some(json!({"title": "b"})),
        )
        .await,
    )
    .await["id"]
        .as_i64()
        .unwrap();
    send(
        &app,
        "POST",
        &format!("/api/tasks/{}/dependencies", b),
        Some(json!({"depends_on_id": a})),
    )
    .await;

    let graph = json_body(send(&app, "GET", "/api/projects/atlas/graph", None).await).await;
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);
}
