//! Tool catalog and executors.
//!
//! Every tool resolves to the same store operations the REST handlers use;
//! failures come back as `isError` results, never as transport errors.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::str::FromStr;

use crate::api::AppState;
use crate::db::{
    DependencyKind, EntityKind, EpicStatus, Id, NewProject, NewTask, Priority, ProjectStatus,
    TaskFilter, TaskPatch, TaskStatus,
};

use super::protocol::{CallToolResult, Tool};

type ToolResult = Result<Value, String>;

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn catalog() -> Vec<Tool> {
    vec![
        Tool {
            name: "create_project",
            description: "Create a project",
            input_schema: schema(
                json!({
                    "name": {"type": "string", "description": "Unique project name"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["active", "draft", "archived"]},
                    "owner_id": {"type": "integer"},
                }),
                &["name"],
            ),
        },
        Tool {
            name: "list_projects",
            description: "List projects, optionally filtered by status",
            input_schema: schema(
                json!({"status": {"type": "string", "enum": ["active", "draft", "archived"]}}),
                &[],
            ),
        },
        Tool {
            name: "get_project",
            description: "Fetch one project by id or name",
            input_schema: schema(
                json!({"project": {"type": "string", "description": "Project id or name"}}),
                &["project"],
            ),
        },
        Tool {
            name: "update_project",
            description: "Update a project's name, description or status",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["active", "draft", "archived"]},
                }),
                &["project"],
            ),
        },
        Tool {
            name: "delete_project",
            description: "Delete a project and everything in it",
            input_schema: schema(
                json!({"project": {"type": "string", "description": "Project id or name"}}),
                &["project"],
            ),
        },
        Tool {
            name: "create_task",
            description: "Create a task in a project",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["todo", "in_progress", "review", "done", "cancelled"]},
                    "priority": {"type": "string", "enum": ["low", "medium", "high", "urgent"]},
                    "parent_id": {"type": "integer"},
                    "epic_id": {"type": "integer"},
                    "assignee_id": {"type": "integer"},
                    "due_date": {"type": "string", "description": "RFC 3339 timestamp"},
                }),
                &["project", "title"],
            ),
        },
        Tool {
            name: "list_tasks",
            description: "List tasks with optional filters",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "status": {"type": "string", "enum": ["todo", "in_progress", "review", "done", "cancelled"]},
                    "epic_id": {"type": "integer"},
                    "assignee_id": {"type": "integer"},
                    "limit": {"type": "integer"},
                }),
                &[],
            ),
        },
        Tool {
            name: "get_task",
            description: "Fetch one task plus whether it can start",
            input_schema: schema(json!({"task_id": {"type": "integer"}}), &["task_id"]),
        },
        Tool {
            name: "update_task",
            description: "Update task fields; omitted fields are left alone",
            input_schema: schema(
                json!({
                    "task_id": {"type": "integer"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["todo", "in_progress", "review", "done", "cancelled"]},
                    "priority": {"type": "string", "enum": ["low", "medium", "high", "urgent"]},
                    "epic_id": {"type": "integer"},
                    "parent_id": {"type": "integer"},
                    "due_date": {"type": "string", "description": "RFC 3339 timestamp"},
                }),
                &["task_id"],
            ),
        },
        Tool {
            name: "delete_task",
            description: "Delete a task and its subtasks",
            input_schema: schema(json!({"task_id": {"type": "integer"}}), &["task_id"]),
        },
        Tool {
            name: "create_epic",
            description: "Create an epic in a project",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["planned", "active", "completed", "cancelled"]},
                }),
                &["project", "name"],
            ),
        },
        Tool {
            name: "list_epics",
            description: "List epics of a project",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "status": {"type": "string", "enum": ["planned", "active", "completed", "cancelled"]},
                }),
                &["project"],
            ),
        },
        Tool {
            name: "update_epic",
            description: "Update an epic",
            input_schema: schema(
                json!({
                    "epic_id": {"type": "integer"},
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "status": {"type": "string", "enum": ["planned", "active", "completed", "cancelled"]},
                }),
                &["epic_id"],
            ),
        },
        Tool {
            name: "delete_epic",
            description: "Delete an epic; tasks are detached unless cascade is set",
            input_schema: schema(
                json!({"epic_id": {"type": "integer"}, "cascade": {"type": "boolean"}}),
                &["epic_id"],
            ),
        },
        Tool {
            name: "create_label",
            description: "Create a label in a project",
            input_schema: schema(
                json!({
                    "project": {"type": "string", "description": "Project id or name"},
                    "name": {"type": "string"},
                    "color": {"type": "string", "description": "Hex color, e.g. #d73a4a"},
                }),
                &["project", "name"],
            ),
        },
        Tool {
            name: "list_labels",
            description: "List labels, optionally scoped to a project",
            input_schema: schema(
                json!({"project": {"type": "string", "description": "Project id or name"}}),
                &[],
            ),
        },
        Tool {
            name: "assign_label",
            description: "Attach a label to a task",
            input_schema: schema(
                json!({"task_id": {"type": "integer"}, "label_id": {"type": "integer"}}),
                &["task_id", "label_id"],
            ),
        },
        Tool {
            name: "assign_task",
            description: "Set or clear a task's assignee",
            input_schema: schema(
                json!({
                    "task_id": {"type": "integer"},
                    "assignee_id": {"type": "integer", "description": "Omit to unassign"},
                }),
                &["task_id"],
            ),
        },
        Tool {
            name: "list_assignees",
            description: "List users visible in a project",
            input_schema: schema(
                json!({"project": {"type": "string", "description": "Project id or name"}}),
                &["project"],
            ),
        },
        Tool {
            name: "add_comment",
            description: "Comment on a task",
            input_schema: schema(
                json!({"task_id": {"type": "integer"}, "body": {"type": "string"}}),
                &["task_id", "body"],
            ),
        },
        Tool {
            name: "list_comments",
            description: "List a task's comments",
            input_schema: schema(json!({"task_id": {"type": "integer"}}), &["task_id"]),
        },
        Tool {
            name: "add_task_dependency",
            description: "Make one task depend on another",
            input_schema: schema(
                json!({
                    "task_id": {"type": "integer"},
                    "depends_on_id": {"type": "integer"},
                    "kind": {"type": "string", "enum": ["finish_to_start", "start_to_start"]},
                }),
                &["task_id", "depends_on_id"],
            ),
        },
        Tool {
            name: "remove_task_dependency",
            description: "Remove a dependency edge",
            input_schema: schema(
                json!({"task_id": {"type": "integer"}, "depends_on_id": {"type": "integer"}}),
                &["task_id", "depends_on_id"],
            ),
        },
        Tool {
            name: "list_task_dependencies",
            description: "List a task's immediate predecessor edges",
            input_schema: schema(json!({"task_id": {"type": "integer"}}), &["task_id"]),
        },
    ]
}

/// Execute one tool. `None` means the tool name is unknown.
pub async fn call_tool(
    state: &AppState,
    actor: Id,
    name: &str,
    args: &Value,
) -> Option<CallToolResult> {
    let result = match name {
        "create_project" => create_project(state, actor, args).await,
        "list_projects" => list_projects(state, args).await,
        "get_project" => get_project(state, args).await,
        "update_project" => update_project(state, actor, args).await,
        "delete_project" => delete_project(state, actor, args).await,
        "create_task" => create_task(state, actor, args).await,
        "list_tasks" => list_tasks(state, args).await,
        "get_task" => get_task(state, args).await,
        "update_task" => update_task(state, actor, args).await,
        "delete_task" => delete_task(state, actor, args).await,
        "create_epic" => create_epic(state, actor, args).await,
        "list_epics" => list_epics(state, args).await,
        "update_epic" => update_epic(state, actor, args).await,
        "delete_epic" => delete_epic(state, actor, args).await,
        "create_label" => create_label(state, args).await,
        "list_labels" => list_labels(state, args).await,
        "assign_label" => assign_label(state, args).await,
        "assign_task" => assign_task(state, actor, args).await,
        "list_assignees" => list_assignees(state, args).await,
        "add_comment" => add_comment(state, actor, args).await,
        "list_comments" => list_comments(state, args).await,
        "add_task_dependency" => add_task_dependency(state, args).await,
        "remove_task_dependency" => remove_task_dependency(state, args).await,
        "list_task_dependencies" => list_task_dependencies(state, args).await,
        _ => return None,
    };

    Some(match result {
        Ok(value) => CallToolResult::text(&value),
        Err(message) => CallToolResult::error(message),
    })
}

// =============================================================================
// Argument helpers
// =============================================================================

fn req_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required argument: {}", key))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn req_id(args: &Value, key: &str) -> Result<Id, String> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("missing required argument: {}", key))
}

fn opt_id(args: &Value, key: &str) -> Option<Id> {
    args.get(key).and_then(Value::as_i64)
}

/// Project selectors accept a JSON string or number, under either
/// `project` or `project_id`.
fn project_selector(args: &Value) -> Result<String, String> {
    match args.get("project").or_else(|| args.get("project_id")) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err("missing required argument: project".to_string()),
    }
}

fn parse<T: FromStr<Err = String>>(value: Option<&str>) -> Result<Option<T>, String> {
    value.map(T::from_str).transpose()
}

fn parse_due_date(args: &Value) -> Result<Option<DateTime<Utc>>, String> {
    opt_str(args, "due_date")
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| format!("invalid due_date: {}", e))
        })
        .transpose()
}

fn to_value<T: serde::Serialize>(value: &T) -> ToolResult {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

// =============================================================================
// Executors
// =============================================================================

async fn create_project(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let input = NewProject {
        name: req_str(args, "name")?.to_string(),
        description: opt_str(args, "description").unwrap_or_default().to_string(),
        status: parse::<ProjectStatus>(opt_str(args, "status"))?.unwrap_or_default(),
        owner_id: opt_id(args, "owner_id"),
    };
    let project = state
        .store
        .create_project(&input, actor)
        .await
        .map_err(|e| e.to_string())?;
    state.embed.queue_job(EntityKind::Project, project.id);
    to_value(&project)
}

async fn list_projects(state: &AppState, args: &Value) -> ToolResult {
    let status = parse::<ProjectStatus>(opt_str(args, "status"))?;
    let projects = state
        .store
        .list_projects(status)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&projects)
}

async fn get_project(state: &AppState, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&project)
}

async fn update_project(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let status = parse::<ProjectStatus>(opt_str(args, "status"))?;
    let project = state
        .store
        .update_project(
            project.id,
            opt_str(args, "name").map(str::to_string),
            opt_str(args, "description").map(str::to_string),
            status,
            actor,
        )
        .await
        .map_err(|e| e.to_string())?;
    state.embed.queue_job(EntityKind::Project, project.id);
    to_value(&project)
}

async fn delete_project(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    state
        .store
        .delete_project(project.id, actor)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"deleted": project.id}))
}

async fn create_task(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let input = NewTask {
        project_id: project.id,
        parent_id: opt_id(args, "parent_id"),
        epic_id: opt_id(args, "epic_id"),
        title: req_str(args, "title")?.to_string(),
        description: opt_str(args, "description").unwrap_or_default().to_string(),
        status: parse::<TaskStatus>(opt_str(args, "status"))?.unwrap_or_default(),
        priority: parse::<Priority>(opt_str(args, "priority"))?.unwrap_or_default(),
        assignee_id: opt_id(args, "assignee_id"),
        due_date: parse_due_date(args)?,
    };
    let task = state
        .store
        .create_task(&input, actor)
        .await
        .map_err(|e| e.to_string())?;
    state.embed.queue_job(EntityKind::Task, task.id);
    to_value(&task)
}

async fn list_tasks(state: &AppState, args: &Value) -> ToolResult {
    let project_id = match project_selector(args) {
        Ok(sel) => Some(
            state
                .store
                .resolve_project(&sel)
                .await
                .map_err(|e| e.to_string())?
                .id,
        ),
        Err(_) => None,
    };
    let filter = TaskFilter {
        project_id,
        epic_id: opt_id(args, "epic_id"),
        parent_id: None,
        status: parse::<TaskStatus>(opt_str(args, "status"))?,
        assignee_id: opt_id(args, "assignee_id"),
        limit: opt_id(args, "limit"),
        offset: None,
    };
    let tasks = state
        .store
        .list_tasks(&filter)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&tasks)
}

async fn get_task(state: &AppState, args: &Value) -> ToolResult {
    let id = req_id(args, "task_id")?;
    let task = state.store.get_task(id).await.map_err(|e| e.to_string())?;
    let (can_start, unmet) = state.store.can_start(id).await.map_err(|e| e.to_string())?;
    let mut value = serde_json::to_value(&task).map_err(|e| e.to_string())?;
    value["can_start"] = json!(can_start);
    value["unmet_dependencies"] = serde_json::to_value(&unmet).map_err(|e| e.to_string())?;
    Ok(value)
}

async fn update_task(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let id = req_id(args, "task_id")?;
    let patch = TaskPatch {
        title: opt_str(args, "title").map(str::to_string),
        description: opt_str(args, "description").map(str::to_string),
        status: parse::<TaskStatus>(opt_str(args, "status"))?,
        priority: parse::<Priority>(opt_str(args, "priority"))?,
        assignee_id: None,
        epic_id: opt_id(args, "epic_id").map(Some),
        parent_id: opt_id(args, "parent_id").map(Some),
        due_date: parse_due_date(args)?.map(Some),
    };
    let task = state
        .store
        .update_task(id, &patch, actor)
        .await
        .map_err(|e| e.to_string())?;
    state.embed.queue_job(EntityKind::Task, task.id);
    to_value(&task)
}

async fn delete_task(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let id = req_id(args, "task_id")?;
    state
        .store
        .delete_task(id, actor)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"deleted": id}))
}

async fn create_epic(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let epic = state
        .store
        .create_epic(
            project.id,
            req_str(args, "name")?,
            opt_str(args, "description").unwrap_or_default(),
            parse::<EpicStatus>(opt_str(args, "status"))?.unwrap_or_default(),
            actor,
        )
        .await
        .map_err(|e| e.to_string())?;
    to_value(&epic)
}

async fn list_epics(state: &AppState, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let epics = state
        .store
        .list_epics(Some(project.id), parse::<EpicStatus>(opt_str(args, "status"))?)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&epics)
}

async fn update_epic(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let epic = state
        .store
        .update_epic(
            req_id(args, "epic_id")?,
            opt_str(args, "name").map(str::to_string),
            opt_str(args, "description").map(str::to_string),
            parse::<EpicStatus>(opt_str(args, "status"))?,
            actor,
        )
        .await
        .map_err(|e| e.to_string())?;
    to_value(&epic)
}

async fn delete_epic(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let id = req_id(args, "epic_id")?;
    let cascade = args.get("cascade").and_then(Value::as_bool).unwrap_or(false);
    state
        .store
        .delete_epic(id, cascade, actor)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"deleted": id}))
}

async fn create_label(state: &AppState, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let label = state
        .store
        .create_label(
            project.id,
            req_str(args, "name")?,
            opt_str(args, "color").unwrap_or("#cccccc"),
        )
        .await
        .map_err(|e| e.to_string())?;
    to_value(&label)
}

async fn list_labels(state: &AppState, args: &Value) -> ToolResult {
    let project_id = match project_selector(args) {
        Ok(sel) => Some(
            state
                .store
                .resolve_project(&sel)
                .await
                .map_err(|e| e.to_string())?
                .id,
        ),
        Err(_) => None,
    };
    let labels = state
        .store
        .list_labels(project_id)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&labels)
}

async fn assign_label(state: &AppState, args: &Value) -> ToolResult {
    let task_id = req_id(args, "task_id")?;
    let label_id = req_id(args, "label_id")?;
    state
        .store
        .assign_label(task_id, label_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"task_id": task_id, "label_id": label_id}))
}

async fn assign_task(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let id = req_id(args, "task_id")?;
    let patch = TaskPatch {
        assignee_id: Some(opt_id(args, "assignee_id")),
        ..Default::default()
    };
    let task = state
        .store
        .update_task(id, &patch, actor)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&task)
}

async fn list_assignees(state: &AppState, args: &Value) -> ToolResult {
    let project = state
        .store
        .resolve_project(&project_selector(args)?)
        .await
        .map_err(|e| e.to_string())?;
    let users = state
        .store
        .project_users(project.id)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&users)
}

async fn add_comment(state: &AppState, actor: Id, args: &Value) -> ToolResult {
    let task_id = req_id(args, "task_id")?;
    let author = (actor != crate::db::SYSTEM_ACTOR).then_some(actor);
    let comment = state
        .store
        .add_comment(task_id, author, req_str(args, "body")?, actor)
        .await
        .map_err(|e| e.to_string())?;
    // Comment text feeds the task's embedding.
    state.embed.queue_job(EntityKind::Task, task_id);
    to_value(&comment)
}

async fn list_comments(state: &AppState, args: &Value) -> ToolResult {
    let comments = state
        .store
        .list_comments(req_id(args, "task_id")?)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&comments)
}

async fn add_task_dependency(state: &AppState, args: &Value) -> ToolResult {
    let kind = parse::<DependencyKind>(opt_str(args, "kind"))?.unwrap_or_default();
    let edge = state
        .store
        .add_dependency(req_id(args, "task_id")?, req_id(args, "depends_on_id")?, kind)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&edge)
}

async fn remove_task_dependency(state: &AppState, args: &Value) -> ToolResult {
    let task_id = req_id(args, "task_id")?;
    let depends_on_id = req_id(args, "depends_on_id")?;
    state
        .store
        .remove_dependency(task_id, depends_on_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"removed": {"task_id": task_id, "depends_on_id": depends_on_id}}))
}

async fn list_task_dependencies(state: &AppState, args: &Value) -> ToolResult {
    let edges = state
        .store
        .list_dependencies(req_id(args, "task_id")?)
        .await
        .map_err(|e| e.to_string())?;
    to_value(&edges)
}
