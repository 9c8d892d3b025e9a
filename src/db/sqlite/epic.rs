//! Epic CRUD. Progress is derived from task statuses at read time.

use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

use super::activity::record_activity;
use super::task::{collect_descendants, delete_tasks_in_tx};
use super::SqliteStore;
use crate::db::{DbError, DbResult, Epic, EpicStatus, Id};

const EPIC_SELECT: &str = "SELECT e.id, e.project_id, e.name, e.description, e.status,
        (SELECT CASE WHEN COUNT(*) = 0 THEN 0
                ELSE (100 * SUM(t.status = 'done')) / COUNT(*) END
         FROM task t WHERE t.epic_id = e.id) AS progress,
        e.created_at, e.updated_at
     FROM epic e";

impl SqliteStore {
    pub async fn create_epic(
        &self,
        project_id: Id,
        name: &str,
        description: &str,
        status: EpicStatus,
        actor_id: Id,
    ) -> DbResult<Epic> {
        if name.trim().is_empty() {
            return Err(DbError::invalid("epic name must not be empty"));
        }
        self.get_project(project_id).await?;

        let mut tx = self.pool().begin().await.map_err(DbError::database)?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO epic (project_id, name, description, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(name)
        .bind(description)
        .bind(status.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        let id = result.last_insert_rowid();
        record_activity(
            &mut tx,
            Some(project_id),
            None,
            actor_id,
            "epic.created",
            None,
            None,
            Some(name.to_string()),
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;

        Ok(Epic {
            id,
            project_id,
            name: name.to_string(),
            description: description.to_string(),
            status,
            progress: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_epic(&self, id: Id) -> DbResult<Epic> {
        let row = sqlx::query(&format!("{} WHERE e.id = ?", EPIC_SELECT))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_epic)
            .ok_or_else(|| DbError::not_found("epic", id))
    }

    pub async fn list_epics(
        &self,
        project_id: Option<Id>,
        status: Option<EpicStatus>,
    ) -> DbResult<Vec<Epic>> {
        let mut sql = EPIC_SELECT.to_string();
        let mut conditions = Vec::new();
        if project_id.is_some() {
            conditions.push("e.project_id = ?");
        }
        if status.is_some() {
            conditions.push("e.status = ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY e.id");

        let mut query = sqlx::query(&sql);
        if let Some(project_id) = project_id {
            query = query.bind(project_id);
        }
        if let Some(status) = status {
            query = query.bind(status.to_string());
        }

        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_epic).collect())
    }

    pub async fn update_epic(
        &self,
        id: Id,
        name: Option<String>,
        description: Option<String>,
        status: Option<EpicStatus>,
        actor_id: Id,
    ) -> DbResult<Epic> {
        let mut epic = self.get_epic(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DbError::invalid("epic name must not be empty"));
            }
            if name != epic.name {
                record_activity(
                    &mut tx,
                    Some(epic.project_id),
                    None,
                    actor_id,
                    "epic.updated",
                    Some("name"),
                    Some(epic.name.clone()),
                    Some(name.clone()),
                )
                .await?;
                epic.name = name;
            }
        }
        if let Some(description) = description {
            epic.description = description;
        }
        if let Some(status) = status {
            if status != epic.status {
                record_activity(
                    &mut tx,
                    Some(epic.project_id),
                    None,
                    actor_id,
                    "epic.updated",
                    Some("status"),
                    Some(epic.status.to_string()),
                    Some(status.to_string()),
                )
                .await?;
                epic.status = status;
            }
        }

        epic.updated_at = Utc::now();
        sqlx::query(
            "UPDATE epic SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&epic.name)
        .bind(&epic.description)
        .bind(epic.status.to_string())
        .bind(epic.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(epic)
    }

    /// Delete an epic. By default its tasks survive with `epic_id` cleared;
    /// with `cascade_tasks` every member task (and its subtasks) goes too.
    /// Returns the storage paths of any attachments the cascade removed.
    pub async fn delete_epic(
        &self,
        id: Id,
        cascade_tasks: bool,
        actor_id: Id,
    ) -> DbResult<Vec<String>> {
        let epic = self.get_epic(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        let mut paths = Vec::new();
        if cascade_tasks {
            let roots: Vec<Id> = sqlx::query_scalar("SELECT id FROM task WHERE epic_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(DbError::database)?;
            let mut ids = Vec::new();
            for root in roots {
                ids.extend(collect_descendants(&mut tx, root).await?);
            }
            ids.sort_unstable();
            ids.dedup();
            paths = delete_tasks_in_tx(&mut tx, &ids).await?;
        } else {
            sqlx::query("UPDATE task SET epic_id = NULL WHERE epic_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::database)?;
        }
        sqlx::query("DELETE FROM epic WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;

        record_activity(
            &mut tx,
            Some(epic.project_id),
            None,
            actor_id,
            "epic.deleted",
            None,
            Some(epic.name),
            None,
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(paths)
    }
}

fn row_to_epic(row: &sqlx::sqlite::SqliteRow) -> Epic {
    Epic {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        description: row.get("description"),
        status: {
            let s: String = row.get("status");
            EpicStatus::from_str(&s).unwrap_or_default()
        },
        progress: row.get("progress"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
