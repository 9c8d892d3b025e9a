//! Project CRUD and the project cascade delete.

use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

use super::activity::record_activity;
use super::user::row_to_user;
use super::SqliteStore;
use crate::db::{DbError, DbResult, Id, NewProject, Project, ProjectStatus, User};

impl SqliteStore {
    pub async fn create_project(&self, input: &NewProject, actor_id: Id) -> DbResult<Project> {
        if input.name.trim().is_empty() {
            return Err(DbError::invalid("project name must not be empty"));
        }

        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        // Name uniqueness only applies to the non-archived set.
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM project WHERE name = ? AND status != 'archived')",
        )
        .bind(&input.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::database)?;

        if taken {
            return Err(DbError::AlreadyExists {
                entity: "project",
                detail: format!("name '{}' is in use", input.name),
            });
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO project (name, description, status, owner_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.status.to_string())
        .bind(input.owner_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        let id = result.last_insert_rowid();
        record_activity(
            &mut tx,
            Some(id),
            None,
            actor_id,
            "project.created",
            None,
            None,
            Some(input.name.clone()),
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;

        Ok(Project {
            id,
            name: input.name.clone(),
            description: input.description.clone(),
            status: input.status,
            owner_id: input.owner_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_project(&self, id: Id) -> DbResult<Project> {
        let row = sqlx::query(
            "SELECT id, name, description, status, owner_id, created_at, updated_at
             FROM project WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_project)
            .ok_or_else(|| DbError::not_found("project", id))
    }

    /// Resolve a `{project}` path segment: numeric id first, then unique name
    /// among non-archived projects.
    pub async fn resolve_project(&self, selector: &str) -> DbResult<Project> {
        if let Ok(id) = selector.parse::<Id>() {
            return self.get_project(id).await;
        }

        let row = sqlx::query(
            "SELECT id, name, description, status, owner_id, created_at, updated_at
             FROM project WHERE name = ? AND status != 'archived'",
        )
        .bind(selector)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::database)?;

        row.as_ref().map(row_to_project).ok_or(DbError::NotFound {
            entity: "project",
            id: selector.to_string(),
        })
    }

    pub async fn list_projects(&self, status: Option<ProjectStatus>) -> DbResult<Vec<Project>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, name, description, status, owner_id, created_at, updated_at
                     FROM project WHERE status = ? ORDER BY id",
                )
                .bind(status.to_string())
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, name, description, status, owner_id, created_at, updated_at
                     FROM project ORDER BY id",
                )
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_project).collect())
    }

    pub async fn update_project(
        &self,
        id: Id,
        name: Option<String>,
        description: Option<String>,
        status: Option<ProjectStatus>,
        actor_id: Id,
    ) -> DbResult<Project> {
        let mut project = self.get_project(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DbError::invalid("project name must not be empty"));
            }
            if name != project.name {
                let taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM project WHERE name = ? AND status != 'archived' AND id != ?)",
                )
                .bind(&name)
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(DbError::database)?;
                if taken {
                    return Err(DbError::AlreadyExists {
                        entity: "project",
                        detail: format!("name '{}' is in use", name),
                    });
                }
                record_activity(
                    &mut tx,
                    Some(id),
                    None,
                    actor_id,
                    "project.updated",
                    Some("name"),
                    Some(project.name.clone()),
                    Some(name.clone()),
                )
                .await?;
                project.name = name;
            }
        }
        if let Some(description) = description {
            if description != project.description {
                record_activity(
                    &mut tx,
                    Some(id),
                    None,
                    actor_id,
                    "project.updated",
                    Some("description"),
                    Some(project.description.clone()),
                    Some(description.clone()),
                )
                .await?;
                project.description = description;
            }
        }
        if let Some(status) = status {
            if status != project.status {
                record_activity(
                    &mut tx,
                    Some(id),
                    None,
                    actor_id,
                    "project.updated",
                    Some("status"),
                    Some(project.status.to_string()),
                    Some(status.to_string()),
                )
                .await?;
                project.status = status;
            }
        }

        project.updated_at = Utc::now();
        sqlx::query(
            "UPDATE project SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.to_string())
        .bind(project.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(project)
    }

    /// Delete a project and everything that belongs to it, in one
    /// transaction. Returns the storage paths of deleted attachments so the
    /// caller can remove the blobs.
    pub async fn delete_project(&self, id: Id, actor_id: Id) -> DbResult<Vec<String>> {
        let project = self.get_project(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT storage_path FROM attachment
             WHERE task_id IN (SELECT id FROM task WHERE project_id = ?)",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::database)?;

        // Dependency rows first: every edge with an endpoint in this project.
        let statements = [
            "DELETE FROM task_dependency WHERE task_id IN (SELECT id FROM task WHERE project_id = ?1)
             OR depends_on_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM comment WHERE task_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM attachment WHERE task_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM task_label WHERE task_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM task_watcher WHERE task_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM activity WHERE project_id = ?1
             OR task_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM embedding_task WHERE entity_id IN (SELECT id FROM task WHERE project_id = ?1)",
            "DELETE FROM embedding_record WHERE (entity_kind = 'task'
             AND entity_id IN (SELECT id FROM task WHERE project_id = ?1))
             OR (entity_kind = 'project' AND entity_id = ?1)",
            "DELETE FROM embedding_project WHERE entity_id = ?1",
            "DELETE FROM task WHERE project_id = ?1",
            "DELETE FROM epic WHERE project_id = ?1",
            "DELETE FROM label WHERE project_id = ?1",
            "DELETE FROM project_member WHERE project_id = ?1",
            "DELETE FROM project WHERE id = ?1",
        ];
        for sql in statements {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::database)?;
        }

        record_activity(
            &mut tx,
            None,
            None,
            actor_id,
            "project.deleted",
            None,
            Some(project.name),
            None,
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(paths)
    }

    /// Users visible within a project: members, the owner, and assignees.
    pub async fn project_users(&self, project_id: Id) -> DbResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, email, password_hash, role, is_active, created_at, updated_at
             FROM user WHERE
               id IN (SELECT user_id FROM project_member WHERE project_id = ?1)
               OR id IN (SELECT assignee_id FROM task WHERE project_id = ?1 AND assignee_id IS NOT NULL)
               OR id IN (SELECT owner_id FROM project WHERE id = ?1 AND owner_id IS NOT NULL)
             ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_user).collect())
    }
}

pub(crate) fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        status: {
            let s: String = row.get("status");
            ProjectStatus::from_str(&s).unwrap_or_default()
        },
        owner_id: row.get("owner_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
