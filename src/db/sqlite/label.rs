//! Labels and task-label assignment.

use chrono::Utc;
use sqlx::Row;

use super::SqliteStore;
use crate::db::{DbError, DbResult, Id, Label};

impl SqliteStore {
    pub async fn create_label(&self, project_id: Id, name: &str, color: &str) -> DbResult<Label> {
        if name.trim().is_empty() {
            return Err(DbError::invalid("label name must not be empty"));
        }
        self.get_project(project_id).await?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM label WHERE project_id = ? AND name = ?)",
        )
        .bind(project_id)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::database)?;
        if taken {
            return Err(DbError::AlreadyExists {
                entity: "label",
                detail: format!("name '{}' is in use in this project", name),
            });
        }

        let now = Utc::now();
        let result =
            sqlx::query("INSERT INTO label (project_id, name, color, created_at) VALUES (?, ?, ?, ?)")
                .bind(project_id)
                .bind(name)
                .bind(color)
                .bind(now)
                .execute(self.pool())
                .await
                .map_err(DbError::database)?;

        Ok(Label {
            id: result.last_insert_rowid(),
            project_id,
            name: name.to_string(),
            color: color.to_string(),
            created_at: now,
        })
    }

    pub async fn list_labels(&self, project_id: Option<Id>) -> DbResult<Vec<Label>> {
        let rows = match project_id {
            Some(project_id) => {
                sqlx::query(
                    "SELECT id, project_id, name, color, created_at
                     FROM label WHERE project_id = ? ORDER BY name",
                )
                .bind(project_id)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, project_id, name, color, created_at FROM label ORDER BY project_id, name",
                )
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_label).collect())
    }

    pub async fn delete_label(&self, id: Id) -> DbResult<()> {
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;
        sqlx::query("DELETE FROM task_label WHERE label_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;
        let result = sqlx::query("DELETE FROM label WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("label", id));
        }
        tx.commit().await.map_err(DbError::database)?;
        Ok(())
    }

    /// Attach a label to a task. The label must belong to the task's project.
    pub async fn assign_label(&self, task_id: Id, label_id: Id) -> DbResult<()> {
        let task = self.get_task(task_id).await?;
        let label_project: Option<Id> =
            sqlx::query_scalar("SELECT project_id FROM label WHERE id = ?")
                .bind(label_id)
                .fetch_optional(self.pool())
                .await
                .map_err(DbError::database)?;

        match label_project {
            None => return Err(DbError::not_found("label", label_id)),
            Some(p) if p != task.project_id => {
                return Err(DbError::invalid("label must belong to the task's project"));
            }
            Some(_) => {}
        }

        sqlx::query("INSERT OR IGNORE INTO task_label (task_id, label_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(label_id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        Ok(())
    }

    pub async fn unassign_label(&self, task_id: Id, label_id: Id) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM task_label WHERE task_id = ? AND label_id = ?")
            .bind(task_id)
            .bind(label_id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound {
                entity: "task label",
                id: format!("{}/{}", task_id, label_id),
            });
        }
        Ok(())
    }

    pub async fn task_labels(&self, task_id: Id) -> DbResult<Vec<Label>> {
        self.get_task(task_id).await?;
        let rows = sqlx::query(
            "SELECT l.id, l.project_id, l.name, l.color, l.created_at
             FROM label l JOIN task_label tl ON tl.label_id = l.id
             WHERE tl.task_id = ? ORDER BY l.name",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_label).collect())
    }
}

fn row_to_label(row: &sqlx::sqlite::SqliteRow) -> Label {
    Label {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        color: row.get("color"),
        created_at: row.get("created_at"),
    }
}
