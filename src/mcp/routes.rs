//! The JSON-RPC endpoint and its REST mirror.
//!
//! Both surfaces go through the same tool/resource dispatchers, so a client
//! sees identical behavior either way.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::api::v1::{bad_request, ApiResult};
use crate::api::AppState;
use crate::auth::AuthContext;

use super::protocol::{
    CallToolResult, Resource, RpcRequest, RpcResponse, Tool, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};
use super::{resources, tools};

/// POST /mcp
///
/// Body is taken raw so a malformed frame still gets a proper -32700
/// response instead of an axum rejection.
#[instrument(skip(state, body))]
pub async fn rpc(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(RpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {}", e),
            ))
        }
    };

    Json(dispatch(&state, &ctx, request).await)
}

async fn dispatch(state: &AppState, ctx: &AuthContext, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        id, method, params, ..
    } = request;

    match method.as_str() {
        "initialize" => RpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "tools/list" => RpcResponse::success(id, json!({"tools": tools::catalog()})),
        "tools/call" => {
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return RpcResponse::failure(id, INVALID_PARAMS, "missing tool name");
            };
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match tools::call_tool(state, ctx.user_id, name, &arguments).await {
                Some(result) => match serde_json::to_value(&result) {
                    Ok(value) => RpcResponse::success(id, value),
                    Err(e) => RpcResponse::failure(id, INTERNAL_ERROR, e.to_string()),
                },
                None => {
                    RpcResponse::failure(id, INVALID_PARAMS, format!("unknown tool: {}", name))
                }
            }
        }
        "resources/list" => RpcResponse::success(id, json!({"resources": resources::catalog()})),
        "resources/read" => {
            let Some(uri) = params.get("uri").and_then(Value::as_str) else {
                return RpcResponse::failure(id, INVALID_PARAMS, "missing resource uri");
            };
            match resources::read_resource(state, uri).await {
                Some(Ok(value)) => RpcResponse::success(id, resource_contents(uri, &value)),
                Some(Err(message)) => RpcResponse::failure(id, INTERNAL_ERROR, message),
                None => {
                    RpcResponse::failure(id, INVALID_PARAMS, format!("unknown resource: {}", uri))
                }
            }
        }
        other => RpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown method: {}", other)),
    }
}

fn resource_contents(uri: &str, value: &Value) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        }]
    })
}

// =============================================================================
// REST mirror
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceQuery {
    pub uri: String,
}

/// GET /mcp/tools
#[instrument(skip(_state))]
pub async fn mirror_list_tools(State(_state): State<AppState>) -> Json<Value> {
    let tools: Vec<Tool> = tools::catalog();
    Json(json!({"tools": tools}))
}

/// POST /mcp/tools/call
#[instrument(skip(state, req))]
pub async fn mirror_call_tool(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CallToolRequest>,
) -> ApiResult<Json<CallToolResult>> {
    match tools::call_tool(&state, ctx.user_id, &req.name, &req.arguments).await {
        Some(result) => Ok(Json(result)),
        None => Err(bad_request(format!("unknown tool: {}", req.name))),
    }
}

/// GET /mcp/resources
#[instrument(skip(_state))]
pub async fn mirror_list_resources(State(_state): State<AppState>) -> Json<Value> {
    let resources: Vec<Resource> = resources::catalog();
    Json(json!({"resources": resources}))
}

/// GET /mcp/resources/get?uri=...
#[instrument(skip(state))]
pub async fn mirror_get_resource(
    State(state): State<AppState>,
    Query(query): Query<ReadResourceQuery>,
) -> ApiResult<Json<Value>> {
    match resources::read_resource(&state, &query.uri).await {
        Some(Ok(value)) => Ok(Json(resource_contents(&query.uri, &value))),
        Some(Err(message)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(crate::api::v1::ErrorResponse { error: message }),
        )),
        None => Err(bad_request(format!("unknown resource: {}", query.uri))),
    }
}
