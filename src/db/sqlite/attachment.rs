//! Attachment metadata. The blob itself lives under the upload directory;
//! only the relative path is stored here.

use chrono::Utc;
use sqlx::Row;

use super::SqliteStore;
use crate::db::{Attachment, DbError, DbResult, Id};

impl SqliteStore {
    pub async fn create_attachment(
        &self,
        task_id: Id,
        filename: &str,
        storage_path: &str,
        size: i64,
        mime: &str,
    ) -> DbResult<Attachment> {
        self.get_task(task_id).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO attachment (task_id, filename, storage_path, size, mime, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(filename)
        .bind(storage_path)
        .bind(size)
        .bind(mime)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(Attachment {
            id: result.last_insert_rowid(),
            task_id,
            filename: filename.to_string(),
            storage_path: storage_path.to_string(),
            size,
            mime: mime.to_string(),
            created_at: now,
        })
    }

    pub async fn get_attachment(&self, id: Id) -> DbResult<Attachment> {
        let row = sqlx::query(
            "SELECT id, task_id, filename, storage_path, size, mime, created_at
             FROM attachment WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_attachment)
            .ok_or_else(|| DbError::not_found("attachment", id))
    }

    pub async fn list_attachments(&self, task_id: Id) -> DbResult<Vec<Attachment>> {
        self.get_task(task_id).await?;
        let rows = sqlx::query(
            "SELECT id, task_id, filename, storage_path, size, mime, created_at
             FROM attachment WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_attachment).collect())
    }

    /// Delete the metadata row. Returns the storage path so the caller can
    /// remove the blob.
    pub async fn delete_attachment(&self, id: Id) -> DbResult<String> {
        let attachment = self.get_attachment(id).await?;
        sqlx::query("DELETE FROM attachment WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        Ok(attachment.storage_path)
    }
}

fn row_to_attachment(row: &sqlx::sqlite::SqliteRow) -> Attachment {
    Attachment {
        id: row.get("id"),
        task_id: row.get("task_id"),
        filename: row.get("filename"),
        storage_path: row.get("storage_path"),
        size: row.get("size"),
        mime: row.get("mime"),
        created_at: row.get("created_at"),
    }
}
