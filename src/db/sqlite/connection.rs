//! Connection and migration management.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::{DbError, DbResult, Id};

/// SQLite-backed store. Cheap to clone; clones share the pool and the
/// per-project lock map.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    /// Advisory locks serializing dependency mutations per project, so two
    /// concurrent adds cannot jointly close a cycle.
    project_locks: Arc<DashMap<Id, Arc<Mutex<()>>>>,
}

impl SqliteStore {
    /// Open (creating if missing) a database file.
    pub async fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            project_locks: Arc::new(DashMap::new()),
        })
    }

    /// In-memory database for tests. Uses a single connection so every
    /// query sees the same memory database.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            project_locks: Arc::new(DashMap::new()),
        })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration {
                message: e.to_string(),
            })
    }

    /// The underlying pool. Exposed for the embedding index and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The advisory lock for one project.
    pub(crate) fn project_lock(&self, project_id: Id) -> Arc<Mutex<()>> {
        self.project_locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
