//! Task comments.

use chrono::Utc;
use sqlx::Row;

use super::activity::record_activity;
use super::SqliteStore;
use crate::db::{Comment, DbError, DbResult, Id};

impl SqliteStore {
    pub async fn add_comment(
        &self,
        task_id: Id,
        author_id: Option<Id>,
        body: &str,
        actor_id: Id,
    ) -> DbResult<Comment> {
        if body.trim().is_empty() {
            return Err(DbError::invalid("comment body must not be empty"));
        }
        let task = self.get_task(task_id).await?;

        let mut tx = self.pool().begin().await.map_err(DbError::database)?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO comment (task_id, author_id, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        record_activity(
            &mut tx,
            Some(task.project_id),
            Some(task_id),
            actor_id,
            "comment.created",
            None,
            None,
            None,
        )
        .await?;

        tx.commit().await.map_err(DbError::database)?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            task_id,
            author_id,
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list_comments(&self, task_id: Id) -> DbResult<Vec<Comment>> {
        self.get_task(task_id).await?;
        let rows = sqlx::query(
            "SELECT id, task_id, author_id, body, created_at, updated_at
             FROM comment WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_comment).collect())
    }

    pub async fn delete_comment(&self, id: Id) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM comment WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("comment", id));
        }
        Ok(())
    }
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        task_id: row.get("task_id"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
