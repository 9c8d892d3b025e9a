//! Integration tests for the JSON-RPC endpoint and its REST mirror.

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

async fn rpc(app: &axum::Router, method: &str, params: Value) -> Value {
    let response = send(
        app,
        "POST",
        "/mcp",
        Some(json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

/// Tool results carry their payload as a JSON string in content[0].text.
fn tool_payload(response: &Value) -> Value {
    let result = &response["result"];
    assert_eq!(result["isError"], false, "tool failed: {}", result);
    serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_a_parse_error() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert!(body["id"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_method_is_method_not_found() {
    let app = test_app().await;
    let body = rpc(&app, "tools/uninstall", json!({})).await;
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_reports_the_server() {
    let app = test_app().await;
    let body = rpc(&app, "initialize", json!({})).await;
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert!(body["result"]["serverInfo"]["name"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn tools_list_names_the_catalog() {
    let app = test_app().await;
    let body = rpc(&app, "tools/list", json!({})).await;
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for expected in [
        "create_project",
        "create_task",
        "add_task_dependency",
        "assign_task",
        "add_comment",
        "list_assignees",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }

    // Every schema is an object schema with its required keys listed.
    for tool in body["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
        assert!(tool["inputSchema"]["required"].is_array());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_created_task_is_visible_over_rest() {
    let app = test_app().await;

    let created = rpc(
        &app,
        "tools/call",
        json!({"name": "create_project", "arguments": {"name": "atlas"}}),
    )
    .await;
    let project_id = tool_payload(&created)["id"].as_i64().unwrap();

    let task = rpc(
        &app,
        "tools/call",
        json!({"name": "create_task", "arguments": {"project": "atlas", "title": "from mcp"}}),
    )
    .await;
    let task_id = tool_payload(&task)["id"].as_i64().unwrap();

    let response = send(&app, "GET", &format!("/api/tasks/{}", task_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["title"], "from mcp");

    // A numeric project_id works as the selector too.
    let task = rpc(
        &app,
        "tools/call",
        json!({"name": "create_task", "arguments": {"project_id": project_id, "title": "by id"}}),
    )
    .await;
    assert_eq!(tool_payload(&task)["project_id"].as_i64().unwrap(), project_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_failures_set_the_error_flag() {
    let app = test_app().await;

    // Missing required argument.
    let body = rpc(
        &app,
        "tools/call",
        json!({"name": "create_task", "arguments": {"project": "nope"}}),
    )
    .await;
    assert_eq!(body["result"]["isError"], true);

    // A store-level failure reads the same way.
    let body = rpc(
        &app,
        "tools/call",
        json!({"name": "get_task", "arguments": {"task_id": 999}}),
    )
    .await;
    assert_eq!(body["result"]["isError"], true);

    // An unknown tool is a protocol error, not a tool error.
    let body = rpc(&app, "tools/call", json!({"name": "launch_missiles"})).await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test(flavor = "multi_thread")]
async fn comment_tool_queues_a_task_reindex() {
    let store = SqliteStore::in_memory().await.expect("in-memory store");
    store.migrate().await.expect("migrations");
    let config = Arc::new(Config {
        admin_api_token: Some(ADMIN_TOKEN.to_string()),
        ..Config::default()
    });
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(LocalProvider::new(16));
    let (_worker, embed) =
        EmbedWorker::new(store.clone(), provider.clone(), CancellationToken::new());
    let handle = embed.clone();
    let app = create_router(AppState::new(store, config, embed, provider));

    rpc(
        &app,
        "tools/call",
        json!({"name": "create_project", "arguments": {"name": "atlas"}}),
    )
    .await;
    let task = rpc(
        &app,
        "tools/call",
        json!({"name": "create_task", "arguments": {"project": "atlas", "title": "t"}}),
    )
    .await;
    let task_id = tool_payload(&task)["id"].as_i64().unwrap();

    // No worker is running, so the comment's job stays visible in the queue.
    let before = handle.pending_jobs();
    let added = rpc(
        &app,
        "tools/call",
        json!({"name": "add_comment", "arguments": {"task_id": task_id, "body": "ship it"}}),
    )
    .await;
    tool_payload(&added);
    assert_eq!(handle.pending_jobs(), before + 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cycles_surface_through_tools_too() {
    let app = test_app().await;
    rpc(
        &app,
        "tools/call",
        json!({"name": "create_project", "arguments": {"name": "atlas"}}),
    )
    .await;
    let a = tool_payload(
        &rpc(
            &app,
            "tools/call",
            json!({"name": "create_task", "arguments": {"project": "atlas", "title": "a"}}),
        )
        .await,
    )["id"]
        .as_i64()
        .unwrap();
    let b = tool_payload(
        &rpc(
            &app,
            "tools/call",
            json!({"name": "create_task", "arguments": {"project": "atlas", "title": "b"}}),
        )
        .await,
    )["id"]
        .as_i64()
        .unwrap();

    let ok = rpc(
        &app,
        "tools/call",
        json!({"name": "add_task_dependency", "arguments": {"task_id": b, "depends_on_id": a}}),
    )
    .await;
    assert_eq!(ok["result"]["isError"], false);

    let cycle = rpc(
        &app,
        "tools/call",
        json!({"name": "add_task_dependency", "arguments": {"task_id": a, "depends_on_id": b}}),
    )
    .await;
    assert_eq!(cycle["result"]["isError"], true);
    assert!(cycle["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("circular"));
}

#[tokio::test(flavor = "multi_thread")]
async fn resources_list_and_read() {
    let app = test_app().await;
    rpc(
        &app,
        "tools/call",
        json!({"name": "create_project", "arguments": {"name": "atlas"}}),
    )
    .await;

    let listed = rpc(&app, "resources/list", json!({})).await;
    let uris: Vec<&str> = listed["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert!(uris.contains(&"projects://list"));
    assert!(uris.contains(&"tasks://overdue"));

    let read = rpc(&app, "resources/read", json!({"uri": "projects://list"})).await;
    let contents = &read["result"]["contents"][0];
    assert_eq!(contents["uri"], "projects://list");
    let projects: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(projects[0]["name"], "atlas");

    let unknown = rpc(&app, "resources/read", json!({"uri": "mail://inbox"})).await;
    assert_eq!(unknown["error"]["code"], -32602);
}

#[tokio::test(flavor = "multi_thread")]
async fn rest_mirror_matches_the_rpc_surface() {
    let app = test_app().await;

    let tools = json_body(send(&app, "GET", "/mcp/tools", None).await).await;
    assert!(!tools["tools"].as_array().unwrap().is_empty());

    let call = send(
        &app,
        "POST",
        "/mcp/tools/call",
        Some(json!({"name": "create_project", "arguments": {"name": "atlas"}})),
    )
    .await;
    assert_eq!(call.status(), StatusCode::OK);
    assert_eq!(json_body(call).await["isError"], false);

    let resources = json_body(send(&app, "GET", "/mcp/resources", None).await).await;
    assert!(!resources["resources"].as_array().unwrap().is_empty());

    let read = send(
        &app,
        "GET",
        "/mcp/resources/get?uri=projects%3A%2F%2Flist",
        None,
    )
    .await;
    assert_eq!(read.status(), StatusCode::OK);
    let body = json_body(read).await;
    assert_eq!(body["contents"][0]["uri"], "projects://list");

    let unknown = send(&app, "POST", "/mcp/tools/call", Some(json!({"name": "nope"}))).await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}
