//! Integration tests for task endpoints and the board views.

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
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN));
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

async fn create_project(app: &axum::Router, name: &str) {
    let response = send(app, "POST", "/api/projects", Some(json!({"name": name}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn create_task(app: &axum::Router, project: &str, body: Value) -> i64 {
    let response = send(
        app,
        "POST",
        &format!("/api/projects/{}/tasks", project),
        Some(body),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["id"].as_i64().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn create_then_list_tasks() {
    let app = test_app().await;
    create_project(&app, "atlas").await;

    let id = create_task(
        &app,
        "atlas",
        json!({"title": "first", "priority": "high"}),
    )
    .await;

    let response = send(&app, "GET", "/api/projects/atlas/tasks", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tasks = json_body(response).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["id"], id);
    assert_eq!(tasks[0]["priority"], "high");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_title_is_rejected() {
    let app = test_app().await;
    create_project(&app, "atlas").await;

    let response = send(
        &app,
        "POST",
        "/api/projects/atlas/tasks",
        Some(json!({"title": "  "})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn detail_reports_startability() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    let a = create_task(&app, "atlas", json!({"title": "a"})).await;
    let b = create_task(&app, "atlas", json!({"title": "b"})).await;
    send(
        &app,
        "POST",
        &format!("/api/tasks/{}/dependencies", b),
        Some(json!({"depends_on_id": a})),
    )
    .await;

    let detail = json_body(send(&app, "GET", &format!("/api/tasks/{}", b), None).await).await;
    assert_eq!(detail["can_start"], false);
    assert_eq!(detail["unmet_dependencies"].as_array().unwrap().len(), 1);

    let free = json_body(send(&app, "GET", &format!("/api/tasks/{}", a), None).await).await;
    assert_eq!(free["can_start"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_null_clears_while_absent_leaves_alone() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    let epic = json_body(
        send(
            &app,
            "POST",
            "/api/projects/atlas/epics",
            Some(json!({"name": "milestone"})),
        )
        .await,
    )
    .await["id"]
        .as_i64()
        .unwrap();
    let task = create_task(&app, "atlas", json!({"title": "t", "epic_id": epic})).await;

    // Absent epic_id: unchanged.
    let updated = json_body(
        send(
            &app,
            "PUT",
            &format!("/api/tasks/{}", task),
            Some(json!({"title": "renamed"})),
        )
        .await,
    )
    .await;
    assert_eq!(updated["epic_id"], epic);

    // Explicit null: cleared.
    let cleared = json_body(
        send(
            &app,
            "PUT",
            &format!("/api/tasks/{}", task),
            Some(json!({"epic_id": null})),
        )
        .await,
    )
    .await;
    assert!(cleared["epic_id"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn task_is_invisible_through_the_wrong_project() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    create_project(&app, "borealis").await;
    let task = create_task(&app, "atlas", json!({"title": "t"})).await;

    let wrong = send(
        &app,
        "GET",
        &format!("/api/projects/borealis/tasks/{}", task),
        None,
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::NOT_FOUND);

    let right = send(
        &app,
        "GET",
        &format!("/api/projects/atlas/tasks/{}", task),
        None,
    )
    .await;
    assert_eq!(right.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn board_orders_unblocked_before_blocked() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    // Blocked task is created first and has the higher priority; readiness
    // must still outrank it.
    let blocked = create_task(&app, "atlas", json!({"title": "blocked", "priority": "urgent"})).await;
    let gate = create_task(&app, "atlas", json!({"title": "gate", "priority": "low"})).await;
    send(
        &app,
        "POST",
        &format!("/api/tasks/{}/dependencies", blocked),
        Some(json!({"depends_on_id": gate})),
    )
    .await;

    let board = json_body(send(&app, "GET", "/api/projects/atlas/board", None).await).await;
    let entries = board.as_array().unwrap();
    assert_eq!(entries[0]["id"], gate);
    assert_eq!(entries[0]["remaining_predecessors"], 0);
    assert_eq!(entries[0]["dependent_count"], 1);
    assert_eq!(entries[1]["id"], blocked);
    assert_eq!(entries[1]["remaining_predecessors"], 1);

    // Completing the gate unblocks the dependent.
    send(
        &app,
        "PUT",
        &format!("/api/tasks/{}", gate),
        Some(json!({"status": "done"})),
    )
    .await;
    let board = json_body(send(&app, "GET", "/api/projects/atlas/board", None).await).await;
    let entry = board
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"] == blocked)
        .unwrap();
    assert_eq!(entry["remaining_predecessors"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn recently_done_tasks_stay_on_the_board() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    let task = create_task(&app, "atlas", json!({"title": "t", "status": "done"})).await;

    let board = json_body(send(&app, "GET", "/api/projects/atlas/board", None).await).await;
    assert_eq!(board.as_array().unwrap()[0]["id"], task);

    let archived =
        json_body(send(&app, "GET", "/api/projects/atlas/board/archived", None).await).await;
    assert!(archived.as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_the_subtree() {
    let app = test_app().await;
    create_project(&app, "atlas").await;
    let parent = create_task(&app, "atlas", json!({"title": "parent"})).await;
    let child = create_task(&app, "atlas", json!({"title": "child", "parent_id": parent})).await;

    let response = send(&app, "DELETE", &format!("/api/tasks/{}", parent), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for id in [parent, child] {
        let gone = send(&app, "GET", &format!("/api/tasks/{}", id), None).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn flat_create_requires_project_id() {
    let app = test_app().await;
    let response = send(&app, "POST", "/api/tasks", Some(json!({"title": "t"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
