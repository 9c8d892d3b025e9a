//! Task dependency edges and the graph queries built on them.
//!
//! Mutations take the project's advisory lock and re-run the cycle probe
//! inside the insert transaction, so two concurrent adds cannot jointly
//! close a cycle.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;

use super::task::row_to_task;
use super::SqliteStore;
use crate::db::{
    DbError, DbResult, DependencyChains, DependencyKind, Id, ProjectGraph, TaskDependency,
    TaskStatus,
};

impl SqliteStore {
    /// Add an edge: `task_id` depends on `depends_on_id`.
    pub async fn add_dependency(
        &self,
        task_id: Id,
        depends_on_id: Id,
        kind: DependencyKind,
    ) -> DbResult<TaskDependency> {
        if task_id == depends_on_id {
            return Err(DbError::invalid("a task cannot depend on itself"));
        }

        let task = self.get_task(task_id).await?;
        let dep = self.get_task(depends_on_id).await?;
        if task.project_id != dep.project_id {
            return Err(DbError::invalid(
                "dependencies must stay within one project",
            ));
        }

        let lock = self.project_lock(task.project_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool().begin().await.map_err(DbError::database)?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM task_dependency WHERE task_id = ? AND depends_on_id = ?)",
        )
        .bind(task_id)
        .bind(depends_on_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::database)?;
        if exists {
            return Err(DbError::AlreadyExists {
                entity: "dependency",
                detail: format!("task {} already depends on {}", task_id, depends_on_id),
            });
        }

        // The new edge closes a cycle iff task_id is already reachable
        // from depends_on_id.
        if reachable(&mut tx, depends_on_id, task_id).await? {
            return Err(DbError::CircularDependency {
                task_id,
                depends_on_id,
            });
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO task_dependency (task_id, depends_on_id, kind, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(depends_on_id)
        .bind(kind.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DbError::database)?;

        tx.commit().await.map_err(DbError::database)?;

        Ok(TaskDependency {
            id: result.last_insert_rowid(),
            task_id,
            depends_on_id,
            kind,
            created_at: now,
        })
    }

    /// Remove an edge. Idempotent: removing an absent edge is a no-op.
    pub async fn remove_dependency(&self, task_id: Id, depends_on_id: Id) -> DbResult<()> {
        self.get_task(task_id).await?;

        sqlx::query("DELETE FROM task_dependency WHERE task_id = ? AND depends_on_id = ?")
            .bind(task_id)
            .bind(depends_on_id)
            .execute(self.pool())
            .await
            .map_err(DbError::database)?;
        Ok(())
    }

    /// Immediate edges where `task_id` is the dependent.
    pub async fn list_dependencies(&self, task_id: Id) -> DbResult<Vec<TaskDependency>> {
        self.get_task(task_id).await?;

        let rows = sqlx::query(
            "SELECT id, task_id, depends_on_id, kind, created_at
             FROM task_dependency WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(rows.iter().map(row_to_dependency).collect())
    }

    /// Transitive predecessors and dependents of a task, each ordered by id
    /// and excluding the task itself.
    pub async fn dependency_chains(&self, task_id: Id) -> DbResult<DependencyChains> {
        self.get_task(task_id).await?;

        // UNION dedupes visited ids, so the walks terminate on their own.
        let blocking = sqlx::query(
            "WITH RECURSIVE up(id) AS (
                 SELECT ?
                 UNION
                 SELECT td.depends_on_id FROM task_dependency td
                 JOIN up ON td.task_id = up.id
             )
             SELECT t.* FROM task t JOIN up ON t.id = up.id WHERE t.id != ? ORDER BY t.id",
        )
        .bind(task_id)
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        let blocked = sqlx::query(
            "WITH RECURSIVE down(id) AS (
                 SELECT ?
                 UNION
                 SELECT td.task_id FROM task_dependency td
                 JOIN down ON td.depends_on_id = down.id
             )
             SELECT t.* FROM task t JOIN down ON t.id = down.id WHERE t.id != ? ORDER BY t.id",
        )
        .bind(task_id)
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(DependencyChains {
            blocking: blocking.iter().map(row_to_task).collect(),
            blocked: blocked.iter().map(row_to_task).collect(),
        })
    }

    /// Whether every immediate predecessor is satisfied. Finish-to-start
    /// predecessors must be done; start-to-start predecessors must have
    /// left todo. Only immediate edges are consulted.
    pub async fn can_start(&self, task_id: Id) -> DbResult<(bool, Vec<TaskDependency>)> {
        self.get_task(task_id).await?;

        let rows = sqlx::query(
            "SELECT td.id, td.task_id, td.depends_on_id, td.kind, td.created_at, p.status
             FROM task_dependency td JOIN task p ON p.id = td.depends_on_id
             WHERE td.task_id = ? ORDER BY td.id",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        let mut unmet = Vec::new();
        for row in &rows {
            let edge = row_to_dependency(row);
            let status: String = row.get("status");
            let status = TaskStatus::from_str(&status).unwrap_or_default();
            let satisfied = match edge.kind {
                DependencyKind::FinishToStart => status == TaskStatus::Done,
                DependencyKind::StartToStart => status != TaskStatus::Todo,
            };
            if !satisfied {
                unmet.push(edge);
            }
        }

        Ok((unmet.is_empty(), unmet))
    }

    /// All tasks of a project plus their dependency edges.
    pub async fn project_graph(&self, project_id: Id) -> DbResult<ProjectGraph> {
        self.get_project(project_id).await?;

        let nodes = self
            .list_tasks(&crate::db::TaskFilter {
                project_id: Some(project_id),
                ..Default::default()
            })
            .await?;

        let rows = sqlx::query(
            "SELECT td.id, td.task_id, td.depends_on_id, td.kind, td.created_at
             FROM task_dependency td JOIN task t ON t.id = td.task_id
             WHERE t.project_id = ? ORDER BY td.id",
        )
        .bind(project_id)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::database)?;

        Ok(ProjectGraph {
            nodes,
            edges: rows.iter().map(row_to_dependency).collect(),
        })
    }
}

/// Whether `to` is reachable from `from` by repeatedly following
/// "depends on" edges. The pre-insert graph is acyclic and `UNION`
/// dedupes visited ids, so the walk terminates without a depth bound.
async fn reachable(conn: &mut SqliteConnection, from: Id, to: Id) -> DbResult<bool> {
    let found: bool = sqlx::query_scalar(
        "WITH RECURSIVE reach(id) AS (
             SELECT ?
             UNION
             SELECT td.depends_on_id FROM task_dependency td
             JOIN reach ON td.task_id = reach.id
         )
         SELECT EXISTS(SELECT 1 FROM reach WHERE id = ?)",
    )
    .bind(from)
    .bind(to)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::database)?;

    Ok(found)
}

fn row_to_dependency(row: &sqlx::sqlite::SqliteRow) -> TaskDependency {
    TaskDependency {
        id: row.get("id"),
        task_id: row.get("task_id"),
        depends_on_id: row.get("depends_on_id"),
        kind: {
            let s: String = row.get("kind");
            DependencyKind::from_str(&s).unwrap_or_default()
        },
        created_at: row.get("created_at"),
    }
}
