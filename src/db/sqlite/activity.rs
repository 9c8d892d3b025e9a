//! Activity log. Rows are written inside the same transaction as the entity
//! mutation that caused them.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use super::SqliteStore;
use crate::db::{Activity, DbError, DbResult, Id};

/// Insert an activity row using the caller's transaction.
pub(crate) async fn record_activity(
    conn: &mut SqliteConnection,
    project_id: Option<Id>,
    task_id: Option<Id>,
    actor_id: Id,
    action: &str,
    field: Option<&str>,
    old_value: Option<String>,
    new_value: Option<String>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO activity (project_id, task_id, actor_id, action, field, old_value, new_value, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(task_id)
    .bind(actor_id)
    .bind(action)
    .bind(field)
    .bind(old_value)
    .bind(new_value)
    .bind(Utc::now())
    .execute(conn)
    .await
    .map_err(DbError::database)?;

    Ok(())
}

impl SqliteStore {
    /// Activity rows for one task, newest first.
    pub async fn list_task_activity(&self, task_id: Id) -> DbResult<Vec<Activity>> {
        let rows = sqlx::query(
            "SELECT id, project_id, task_id, actor_id, action, field, old_value, new_value, created_at
             FROM activity WHERE task_id = ? ORDER BY id DESC",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_activity).collect())
    }
}

fn row_to_activity(row: &sqlx::sqlite::SqliteRow) -> Activity {
    Activity {
        id: row.get("id"),
        project_id: row.get("project_id"),
        task_id: row.get("task_id"),
        actor_id: row.get("actor_id"),
        action: row.get("action"),
        field: row.get("field"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        created_at: row.get("created_at"),
    }
}
