//! Task CRUD, the recursive task delete, and the board stats query.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;

use super::activity::record_activity;
use super::helpers::{limit_offset, placeholders};
use super::SqliteStore;
use crate::db::{
    BoardEntry, DbError, DbResult, Id, NewTask, Priority, Task, TaskFilter, TaskPatch, TaskStatus,
};

/// Maximum parent-chain depth. The chain is finite by invariant; this bound
/// turns a corrupt chain into an error instead of a hang.
pub(crate) const MAX_TASK_DEPTH: i64 = 64;

const TASK_COLUMNS: &str = "id, project_id, parent_id, epic_id, title, description, status, \
     priority, assignee_id, due_date, completed_at, created_by, updated_by, created_at, updated_at";

impl SqliteStore {
    pub async fn create_task(&self, input: &NewTask, actor_id: Id) -> DbResult<Task> {
        if input.title.trim().is_empty() {
            return Err(DbError::invalid("task title must not be empty"));
        }

        // Project must exist before we validate anything against it.
        self.get_project(input.project_id).await?;

        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        if let Some(parent_id) = input.parent_id {
            validate_parent(&mut tx, input.project_id, parent_id, None).await?;
        }
        if let Some(epic_id) = input.epic_id {
            validate_epic(&mut tx, input.project_id, epic_id).await?;
        }

        let now = Utc::now();
        let completed_at = matches!(input.status, TaskStatus::Done).then_some(now);

        let result = sqlx::query(
            "INSERT INTO task (project_id, parent_id, epic_id, title, description, status, priority,
                               assignee_id, due_date, completed_at, created_by, updated_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(input.project_id)
        .bind(input.parent_id)
        .bind(input.epic_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.status.to_string())
        .bind(input.priority.to_string())
        .bind(input.assignee_id)
        .bind(input.due_date)
        .bind(completed_at)
        .bind(actor_id)
        .bind(None::<Id>)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        let id = result.last_insert_rowid();
        record_activity(
            &mut tx,
            Some(input.project_id),
            Some(id),
            actor_id,
            "task.created",
            None,
            None,
            Some(input.title.clone()),
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;

        Ok(Task {
            id,
            project_id: input.project_id,
            parent_id: input.parent_id,
            epic_id: input.epic_id,
            title: input.title.clone(),
            description: input.description.clone(),
            status: input.status,
            priority: input.priority,
            assignee_id: input.assignee_id,
            due_date: input.due_date,
            completed_at,
            created_by: actor_id,
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_task(&self, id: Id) -> DbResult<Task> {
        let row = sqlx::query(&format!("SELECT {} FROM task WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_task)
            .ok_or_else(|| DbError::not_found("task", id))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> DbResult<Vec<Task>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(project_id) = filter.project_id {
            conditions.push("project_id = ?");
            binds.push(project_id.to_string());
        }
        if let Some(epic_id) = filter.epic_id {
            conditions.push("epic_id = ?");
            binds.push(epic_id.to_string());
        }
        if let Some(parent_id) = filter.parent_id {
            conditions.push("parent_id = ?");
            binds.push(parent_id.to_string());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            binds.push(status.to_string());
        }
        if let Some(assignee_id) = filter.assignee_id {
            conditions.push("assignee_id = ?");
            binds.push(assignee_id.to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM task {} ORDER BY id{}",
            TASK_COLUMNS,
            where_clause,
            limit_offset(filter.limit, filter.offset)
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_task).collect())
    }

    pub async fn update_task(&self, id: Id, patch: &TaskPatch, actor_id: Id) -> DbResult<Task> {
        let mut task = self.get_task(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;
        let now = Utc::now();

        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(DbError::invalid("task title must not be empty"));
            }
            if *title != task.title {
                record_activity(
                    &mut tx,
                    Some(task.project_id),
                    Some(id),
                    actor_id,
                    "task.updated",
                    Some("title"),
                    Some(task.title.clone()),
                    Some(title.clone()),
                )
                .await?;
                task.title = title.clone();
            }
        }
        if let Some(description) = &patch.description {
            if *description != task.description {
                record_activity(
                    &mut tx,
                    Some(task.project_id),
                    Some(id),
                    actor_id,
                    "task.updated",
                    Some("description"),
                    None,
                    None,
                )
                .await?;
                task.description = description.clone();
            }
        }
        if let Some(status) = patch.status {
            if status != task.status {
                record_activity(
                    &mut tx,
                    Some(task.project_id),
                    Some(id),
                    actor_id,
                    "task.updated",
                    Some("status"),
                    Some(task.status.to_string()),
                    Some(status.to_string()),
                )
                .await?;
                task.status = status;
                // completed_at is set iff the task is done.
                task.completed_at = matches!(status, TaskStatus::Done).then_some(now);
            }
        }
        if let Some(priority) = patch.priority {
            if priority != task.priority {
                record_activity(
                    &mut tx,
                    Some(task.project_id),
                    Some(id),
                    actor_id,
                    "task.updated",
                    Some("priority"),
                    Some(task.priority.to_string()),
                    Some(priority.to_string()),
                )
                .await?;
                task.priority = priority;
            }
        }
        if let Some(assignee_id) = patch.assignee_id {
            if assignee_id != task.assignee_id {
                record_activity(
                    &mut tx,
                    Some(task.project_id),
                    Some(id),
                    actor_id,
                    "task.updated",
                    Some("assignee"),
                    task.assignee_id.map(|v| v.to_string()),
                    assignee_id.map(|v| v.to_string()),
                )
                .await?;
                task.assignee_id = assignee_id;
            }
        }
        if let Some(epic_id) = patch.epic_id {
            if let Some(epic_id) = epic_id {
                validate_epic(&mut tx, task.project_id, epic_id).await?;
            }
            task.epic_id = epic_id;
        }
        if let Some(parent_id) = patch.parent_id {
            if let Some(parent_id) = parent_id {
                validate_parent(&mut tx, task.project_id, parent_id, Some(id)).await?;
            }
            task.parent_id = parent_id;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }

        task.updated_by = Some(actor_id);
        task.updated_at = now;

        sqlx::query(
            "UPDATE task SET parent_id = ?, epic_id = ?, title = ?, description = ?, status = ?,
                             priority = ?, assignee_id = ?, due_date = ?, completed_at = ?,
                             updated_by = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(task.parent_id)
        .bind(task.epic_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.to_string())
        .bind(task.priority.to_string())
        .bind(task.assignee_id)
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(task.updated_by)
        .bind(task.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(task)
    }

    /// Delete a task, its transitive subtasks, and every row mentioning any
    /// of them, in one transaction. Returns deleted attachment paths.
    pub async fn delete_task(&self, id: Id, actor_id: Id) -> DbResult<Vec<String>> {
        let task = self.get_task(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        let ids = collect_descendants(&mut tx, id).await?;
        let paths = delete_tasks_in_tx(&mut tx, &ids).await?;

        record_activity(
            &mut tx,
            Some(task.project_id),
            None,
            actor_id,
            "task.deleted",
            None,
            Some(task.title),
            None,
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(paths)
    }

    /// Tasks of one project joined with the dependency counters the board
    /// comparator needs. Unsorted; ordering lives in `crate::board`.
    pub async fn board_entries(&self, project_id: Id) -> DbResult<Vec<BoardEntry>> {
        let sql = format!(
            "SELECT t.{columns},
                (SELECT COUNT(*) FROM task_dependency td JOIN task p ON p.id = td.depends_on_id
                 WHERE td.task_id = t.id
                   AND ((td.kind = 'finish_to_start' AND p.status != 'done')
                     OR (td.kind = 'start_to_start' AND p.status = 'todo'))) AS remaining_predecessors,
                (SELECT COUNT(*) FROM task_dependency td WHERE td.depends_on_id = t.id) AS dependent_count,
                (SELECT COUNT(*) FROM task_dependency td WHERE td.task_id = t.id) AS predecessor_count
             FROM task t WHERE t.project_id = ?",
            columns = TASK_COLUMNS.replace(", ", ", t."),
        );

        let rows = sqlx::query(&sql)
            .bind(project_id)
            .fetch_all(self.pool())
            .await
            .map_err(DbError::database)?;

        Ok(rows
            .iter()
            .map(|row| BoardEntry {
                task: row_to_task(row),
                remaining_predecessors: row.get("remaining_predecessors"),
                dependent_count: row.get("dependent_count"),
                predecessor_count: row.get("predecessor_count"),
            })
            .collect())
    }
}

/// Collect `root` plus all transitive subtasks, bounded by MAX_TASK_DEPTH.
pub(crate) async fn collect_descendants(
    conn: &mut SqliteConnection,
    root: Id,
) -> DbResult<Vec<Id>> {
    let ids: Vec<Id> = sqlx::query_scalar(
        "WITH RECURSIVE sub(id, depth) AS (
             SELECT id, 0 FROM task WHERE id = ?
             UNION ALL
             SELECT t.id, s.depth + 1 FROM task t JOIN sub s ON t.parent_id = s.id
             WHERE s.depth < ?
         )
         SELECT id FROM sub",
    )
    .bind(root)
    .bind(MAX_TASK_DEPTH)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::database)?;

    Ok(ids)
}

/// Delete the given task ids and all rows referencing them. Caller owns the
/// transaction. Returns the storage paths of deleted attachments.
pub(crate) async fn delete_tasks_in_tx(
    conn: &mut SqliteConnection,
    ids: &[Id],
) -> DbResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let marks = placeholders(ids.len());

    let path_sql = format!(
        "SELECT storage_path FROM attachment WHERE task_id IN ({})",
        marks
    );
    let mut path_query = sqlx::query_scalar(&path_sql);
    for id in ids {
        path_query = path_query.bind(id);
    }
    let paths: Vec<String> = path_query
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::database)?;

    let statements = [
        format!(
            "DELETE FROM task_dependency WHERE task_id IN ({m}) OR depends_on_id IN ({m})",
            m = marks
        ),
        format!("DELETE FROM comment WHERE task_id IN ({})", marks),
        format!("DELETE FROM attachment WHERE task_id IN ({})", marks),
        format!("DELETE FROM task_label WHERE task_id IN ({})", marks),
        format!("DELETE FROM task_watcher WHERE task_id IN ({})", marks),
        format!("DELETE FROM activity WHERE task_id IN ({})", marks),
        format!("DELETE FROM embedding_task WHERE entity_id IN ({})", marks),
        format!(
            "DELETE FROM embedding_record WHERE entity_kind = 'task' AND entity_id IN ({})",
            marks
        ),
        format!("DELETE FROM task WHERE id IN ({})", marks),
    ];

    for sql in &statements {
        // The dependency statement binds the id list twice.
        let bind_rounds = if sql.contains("depends_on_id") { 2 } else { 1 };
        let mut query = sqlx::query(sql);
        for _ in 0..bind_rounds {
            for id in ids {
                query = query.bind(id);
            }
        }
        query.execute(&mut *conn).await.map_err(DbError::database)?;
    }

    Ok(paths)
}

/// A parent must exist, live in the same project, not be the task itself,
/// not be one of its descendants, and not sit at the depth limit.
async fn validate_parent(
    conn: &mut SqliteConnection,
    project_id: Id,
    parent_id: Id,
    task_id: Option<Id>,
) -> DbResult<()> {
    if task_id == Some(parent_id) {
        return Err(DbError::invalid("a task cannot be its own parent"));
    }

    let parent_project: Option<Id> = sqlx::query_scalar("SELECT project_id FROM task WHERE id = ?")
        .bind(parent_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::database)?;

    match parent_project {
        None => return Err(DbError::not_found("task", parent_id)),
        Some(p) if p != project_id => {
            return Err(DbError::invalid(
                "parent task must belong to the same project",
            ));
        }
        Some(_) => {}
    }

    // Walk the ancestor chain of the proposed parent: it must terminate
    // within the depth bound and must not pass through the task itself.
    let ancestors: Vec<Id> = sqlx::query_scalar(
        "WITH RECURSIVE up(id, parent_id, depth) AS (
             SELECT id, parent_id, 0 FROM task WHERE id = ?
             UNION ALL
             SELECT t.id, t.parent_id, up.depth + 1 FROM task t JOIN up ON t.id = up.parent_id
             WHERE up.depth < ?
         )
         SELECT id FROM up",
    )
    .bind(parent_id)
    .bind(MAX_TASK_DEPTH)
    .fetch_all(&mut *conn)
    .await
    .map_err(DbError::database)?;

    if ancestors.len() as i64 >= MAX_TASK_DEPTH {
        return Err(DbError::invalid("parent chain exceeds the depth limit"));
    }
    if let Some(task_id) = task_id {
        if ancestors.contains(&task_id) {
            return Err(DbError::invalid(
                "cannot reparent a task under its own subtask",
            ));
        }
    }

    Ok(())
}

async fn validate_epic(conn: &mut SqliteConnection, project_id: Id, epic_id: Id) -> DbResult<()> {
    let epic_project: Option<Id> = sqlx::query_scalar("SELECT project_id FROM epic WHERE id = ?")
        .bind(epic_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::database)?;

    match epic_project {
        None => Err(DbError::not_found("epic", epic_id)),
        Some(p) if p != project_id => Err(DbError::invalid("epic must belong to the same project")),
        Some(_) => Ok(()),
    }
}

pub(crate) fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Task {
    Task {
        id: row.get("id"),
        project_id: row.get("project_id"),
        parent_id: row.get("parent_id"),
        epic_id: row.get("epic_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: {
            let s: String = row.get("status");
            TaskStatus::from_str(&s).unwrap_or_default()
        },
        priority: {
            let s: String = row.get("priority");
            Priority::from_str(&s).unwrap_or_default()
        },
        assignee_id: row.get("assignee_id"),
        due_date: row.get("due_date"),
        completed_at: row.get("completed_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
