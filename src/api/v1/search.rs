//! Semantic search over the embedding index, with a LIKE fallback so fresh
//! entities show up before the worker has indexed them.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::db::{DbError, EntityKind, Id};

use super::{bad_request, db_error, ApiResult};

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Query text
    #[param(example = "login page bug")]
    pub q: String,
    /// project, task or document; defaults to task
    #[param(example = "task")]
    pub kind: Option<String>,
    #[param(example = 20)]
    pub limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct SearchResult {
    pub kind: EntityKind,
    pub entity_id: Id,
    /// Cosine similarity for vector hits; absent for LIKE matches.
    pub score: Option<f32>,
    pub title: String,
}

#[utoipa::path(
    get,
    path = "/api/search",
    tag = "search",
    params(SearchQuery),
    responses((status = 200, description = "Vector hits first, then LIKE matches", body = [SearchResult]))
)]
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    if query.q.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let kind = query
        .kind
        .as_deref()
        .map(EntityKind::from_str)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or(EntityKind::Task);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(100);

    let mut results = Vec::new();

    // Vector hits first. A provider failure degrades to LIKE-only.
    match state.provider.embed(&query.q).await {
        Ok(vector) => {
            let hits = state
                .index()
                .search(kind, &vector, limit)
                .await
                .map_err(db_error)?;
            for hit in hits {
                if let Some(title) = entity_title(&state, kind, hit.entity_id).await? {
                    results.push(SearchResult {
                        kind,
                        entity_id: hit.entity_id,
                        score: Some(hit.score),
                        title,
                    });
                }
            }
        }
        Err(e) => debug!(error = %e, "query embedding failed, falling back to LIKE"),
    }

    for (entity_id, title) in like_matches(&state, kind, &query.q, limit).await? {
        if !results.iter().any(|r| r.entity_id == entity_id) {
            results.push(SearchResult {
                kind,
                entity_id,
                score: None,
                title,
            });
        }
    }

    results.truncate(limit);
    Ok(Json(results))
}

async fn entity_title(
    state: &AppState,
    kind: EntityKind,
    entity_id: Id,
) -> ApiResult<Option<String>> {
    let result = match kind {
        EntityKind::Project => state.store.get_project(entity_id).await.map(|p| p.name),
        EntityKind::Task => state.store.get_task(entity_id).await.map(|t| t.title),
        EntityKind::Document => state
            .store
            .get_attachment(entity_id)
            .await
            .map(|a| a.filename),
    };
    match result {
        Ok(title) => Ok(Some(title)),
        Err(DbError::NotFound { .. }) => Ok(None),
        Err(e) => Err(db_error(e)),
    }
}

async fn like_matches(
    state: &AppState,
    kind: EntityKind,
    q: &str,
    limit: usize,
) -> ApiResult<Vec<(Id, String)>> {
    let pattern = format!("%{}%", q.replace('%', "").replace('_', "\\_"));
    let sql = match kind {
        EntityKind::Project => {
            "SELECT id, name AS title FROM project
             WHERE name LIKE ?1 OR description LIKE ?1 ORDER BY id LIMIT ?2"
        }
        EntityKind::Task => {
            "SELECT id, title FROM task
             WHERE title LIKE ?1 OR description LIKE ?1 ORDER BY id LIMIT ?2"
        }
        EntityKind::Document => {
            "SELECT id, filename AS title FROM attachment WHERE filename LIKE ?1 ORDER BY id LIMIT ?2"
        }
    };

    let rows = sqlx::query(sql)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(state.store.pool())
        .await
        .map_err(|e| db_error(DbError::Database {
            message: e.to_string(),
        }))?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<Id, _>("id"), row.get::<String, _>("title")))
        .collect())
}
