//! Read-only resource views exposed over `resources/list` and
//! `resources/read`.

use chrono::Utc;
use serde_json::Value;

use crate::api::AppState;
use crate::db::{EpicStatus, Priority, Task, TaskStatus};

use super::protocol::Resource;

pub fn catalog() -> Vec<Resource> {
    vec![
        Resource {
            uri: "projects://list",
            name: "All projects",
            description: "Every project with its status",
            mime_type: "application/json",
        },
        Resource {
            uri: "tasks://overdue",
            name: "Overdue tasks",
            description: "Open tasks whose due date has passed",
            mime_type: "application/json",
        },
        Resource {
            uri: "tasks://high-priority",
            name: "High-priority tasks",
            description: "Open tasks at high or urgent priority",
            mime_type: "application/json",
        },
        Resource {
            uri: "epics://active",
            name: "Active epics",
            description: "Epics currently in progress, with derived progress",
            mime_type: "application/json",
        },
        Resource {
            uri: "labels://all",
            name: "All labels",
            description: "Labels across every project",
            mime_type: "application/json",
        },
    ]
}

fn is_open(task: &Task) -> bool {
    !matches!(task.status, TaskStatus::Done | TaskStatus::Cancelled)
}

/// Resolve one resource URI to its JSON payload. `None` means the URI is
/// unknown.
pub async fn read_resource(state: &AppState, uri: &str) -> Option<Result<Value, String>> {
    let result = match uri {
        "projects://list" => state
            .store
            .list_projects(None)
            .await
            .map_err(|e| e.to_string())
            .and_then(|p| serde_json::to_value(&p).map_err(|e| e.to_string())),
        "tasks://overdue" => open_tasks(state, |t| {
            t.due_date.is_some_and(|due| due < Utc::now())
        })
        .await,
        "tasks://high-priority" => open_tasks(state, |t| {
            matches!(t.priority, Priority::High | Priority::Urgent)
        })
        .await,
        "epics://active" => state
            .store
            .list_epics(None, Some(EpicStatus::Active))
            .await
            .map_err(|e| e.to_string())
            .and_then(|e| serde_json::to_value(&e).map_err(|err| err.to_string())),
        "labels://all" => state
            .store
            .list_labels(None)
            .await
            .map_err(|e| e.to_string())
            .and_then(|l| serde_json::to_value(&l).map_err(|e| e.to_string())),
        _ => return None,
    };
    Some(result)
}

async fn open_tasks(
    state: &AppState,
    keep: impl Fn(&Task) -> bool,
) -> Result<Value, String> {
    let tasks = state
        .store
        .list_tasks(&Default::default())
        .await
        .map_err(|e| e.to_string())?;
    let tasks: Vec<Task> = tasks.into_iter().filter(|t| is_open(t) && keep(t)).collect();
    serde_json::to_value(&tasks).map_err(|e| e.to_string())
}
