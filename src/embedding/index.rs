//! Vector storage and search.
//!
//! Vectors live as little-endian f32 blobs in per-kind tables, with a shared
//! `embedding_record` metadata row. Search is a cosine scan in Rust; the
//! corpus sizes here do not justify an index structure.

use sqlx::Row;

use crate::db::{DbError, DbResult, EntityKind, Id, SqliteStore};

#[derive(Clone)]
pub struct EmbeddingIndex {
    store: SqliteStore,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub kind: EntityKind,
    pub entity_id: Id,
    pub score: f32,
}

impl EmbeddingIndex {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Insert or replace the vector for one entity.
    pub async fn upsert(
        &self,
        kind: EntityKind,
        entity_id: Id,
        vector: &[f32],
        model: &str,
    ) -> DbResult<()> {
        let blob = encode_vector(vector);
        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(DbError::database)?;

        let sql = format!(
            "INSERT INTO {} (entity_id, vector) VALUES (?, ?)
             ON CONFLICT(entity_id) DO UPDATE SET vector = excluded.vector",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(entity_id)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;

        sqlx::query(
            "INSERT INTO embedding_record (entity_kind, entity_id, model, dimension, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
               model = excluded.model, dimension = excluded.dimension,
               updated_at = excluded.updated_at",
        )
        .bind(kind.to_string())
        .bind(entity_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)
    }

    pub async fn delete(&self, kind: EntityKind, entity_id: Id) -> DbResult<()> {
        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(DbError::database)?;

        let sql = format!("DELETE FROM {} WHERE entity_id = ?", kind.table());
        sqlx::query(&sql)
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;
        sqlx::query("DELETE FROM embedding_record WHERE entity_kind = ? AND entity_id = ?")
            .bind(kind.to_string())
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)
    }

    /// Top `limit` entities of one kind by cosine similarity.
    pub async fn search(
        &self,
        kind: EntityKind,
        query: &[f32],
        limit: usize,
    ) -> DbResult<Vec<SearchHit>> {
        let sql = format!("SELECT entity_id, vector FROM {}", kind.table());
        let rows = sqlx::query(&sql)
            .fetch_all(self.store.pool())
            .await
            .map_err(DbError::database)?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let entity_id: Id = row.get("entity_id");
                let blob: Vec<u8> = row.get("vector");
                let vector = decode_vector(&blob);
                cosine(query, &vector).map(|score| SearchHit {
                    kind,
                    entity_id,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.entity_id.cmp(&b.entity_id)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// The text to embed for one entity, or None when it no longer exists.
    /// Documents are attachment filenames; their content is out of reach.
    pub async fn entity_text(&self, kind: EntityKind, entity_id: Id) -> DbResult<Option<String>> {
        let result = match kind {
            EntityKind::Project => self
                .store
                .get_project(entity_id)
                .await
                .map(|p| format!("{}\n{}", p.name, p.description)),
            EntityKind::Task => match self.store.get_task(entity_id).await {
                Ok(t) => {
                    // Comment bodies ride along so discussion is searchable.
                    let comments = self.store.list_comments(entity_id).await?;
                    let mut text = format!("{}\n{}", t.title, t.description);
                    for comment in &comments {
                        text.push('\n');
                        text.push_str(&comment.body);
                    }
                    Ok(text)
                }
                Err(e) => Err(e),
            },
            EntityKind::Document => self
                .store
                .get_attachment(entity_id)
                .await
                .map(|a| a.filename),
        };
        match result {
            Ok(text) => Ok(Some(text)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity; None when lengths differ or either vector is zero.
fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na * nb))
}
