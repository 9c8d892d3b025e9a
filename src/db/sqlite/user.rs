//! Users. Deleting a user detaches every reference instead of cascading:
//! history and content survive, anonymized.

use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

use super::SqliteStore;
use crate::db::{DbError, DbResult, Id, Role, User, SYSTEM_ACTOR};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

impl SqliteStore {
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> DbResult<User> {
        if username.trim().is_empty() {
            return Err(DbError::invalid("username must not be empty"));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user WHERE username = ? OR email = ?)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::database)?;
        if taken {
            return Err(DbError::AlreadyExists {
                entity: "user",
                detail: format!("username or email '{}' is in use", username),
            });
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO user (username, email, password_hash, role, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role.to_string())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_user(&self, id: Id) -> DbResult<User> {
        let row = sqlx::query(&format!("SELECT {} FROM user WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_user)
            .ok_or_else(|| DbError::not_found("user", id))
    }

    pub async fn list_users(&self) -> DbResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM user ORDER BY id", USER_COLUMNS))
            .fetch_all(self.pool())
            .await
            .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_user).collect())
    }

    /// Delete a user. Assignments and authorship become null, `created_by`
    /// falls back to the system actor, memberships and credentials go away.
    pub async fn delete_user(&self, id: Id) -> DbResult<()> {
        self.get_user(id).await?;
        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        let detach = [
            "UPDATE task SET assignee_id = NULL WHERE assignee_id = ?",
            "UPDATE task SET updated_by = NULL WHERE updated_by = ?",
            "UPDATE project SET owner_id = NULL WHERE owner_id = ?",
            "UPDATE comment SET author_id = NULL WHERE author_id = ?",
            "DELETE FROM task_watcher WHERE user_id = ?",
            "DELETE FROM project_member WHERE user_id = ?",
            "DELETE FROM auth_session WHERE user_id = ?",
            "DELETE FROM refresh_token WHERE user_id = ?",
            "DELETE FROM api_token WHERE user_id = ?",
        ];
        for sql in detach {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::database)?;
        }

        sqlx::query("UPDATE task SET created_by = ? WHERE created_by = ?")
            .bind(SYSTEM_ACTOR)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;

        sqlx::query("DELETE FROM user WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)?;
        Ok(())
    }

    pub async fn add_project_member(&self, project_id: Id, user_id: Id, role: Role) -> DbResult<()> {
        self.get_project(project_id).await?;
        self.get_user(user_id).await?;

        sqlx::query(
            "INSERT INTO project_member (project_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role.to_string())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(DbError::database)?;
        Ok(())
    }
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: {
            let s: String = row.get("role");
            Role::from_str(&s).unwrap_or_default()
        },
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
