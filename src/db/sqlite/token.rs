//! API tokens. Only the sha256 of the plaintext is stored; the plaintext is
//! returned exactly once, at creation.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::SqliteStore;
use crate::db::{ApiToken, DbError, DbResult, Id};

const TOKEN_COLUMNS: &str = "id, user_id, name, description, token_hash, scopes, expires_at, \
     last_used_at, is_active, created_at";

impl SqliteStore {
    pub async fn create_token(
        &self,
        user_id: Id,
        name: &str,
        description: &str,
        token_hash: &str,
        scopes: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> DbResult<ApiToken> {
        if name.trim().is_empty() {
            return Err(DbError::invalid("token name must not be empty"));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO api_token (user_id, name, description, token_hash, scopes, expires_at, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(token_hash)
        .bind(scopes)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(ApiToken {
            id: result.last_insert_rowid(),
            user_id,
            name: name.to_string(),
            description: description.to_string(),
            token_hash: token_hash.to_string(),
            scopes: scopes.to_string(),
            expires_at,
            last_used_at: None,
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_token(&self, id: Id) -> DbResult<ApiToken> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM api_token WHERE id = ?",
            TOKEN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::database)?;

        row.as_ref()
            .map(row_to_token)
            .ok_or_else(|| DbError::not_found("token", id))
    }

    /// Look up a token by the hash of a presented plaintext.
    pub async fn find_token_by_hash(&self, token_hash: &str) -> DbResult<Option<ApiToken>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM api_token WHERE token_hash = ?",
            TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(row.as_ref().map(row_to_token))
    }

    pub async fn list_tokens(&self) -> DbResult<Vec<ApiToken>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_token ORDER BY id",
            TOKEN_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_token).collect())
    }

    /// Revoke a token: deactivate it and force expiry. The row is kept for
    /// auditing.
    pub async fn revoke_token(&self, id: Id) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE api_token SET is_active = 0, expires_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(DbError::database)?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("token", id));
        }
        Ok(())
    }

    /// Best-effort usage stamp; failures are swallowed by the caller.
    pub async fn touch_token(&self, id: Id) -> DbResult<()> {
        sqlx::query("UPDATE api_token SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        Ok(())
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> ApiToken {
    ApiToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        token_hash: row.get("token_hash"),
        scopes: row.get("scopes"),
        expires_at: row.get("expires_at"),
        last_used_at: row.get("last_used_at"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}
