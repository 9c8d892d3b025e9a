use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::db::{EntityKind, NewProject, NewTask, SqliteStore, SYSTEM_ACTOR};

/// Provider that counts calls and records the texts it saw.
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0])
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Provider that always fails.
struct FailingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Request {
            message: "unreachable host".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        2
    }
}

async fn seed_task(store: &SqliteStore) -> crate::db::Task {
    let project = store
        .create_project(
            &NewProject {
                name: "p".into(),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap();
    store
        .create_task(
            &NewTask {
                project_id: project.id,
                title: "t".into(),
                ..Default::default()
            },
            SYSTEM_ACTOR,
        )
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_jobs_coalesce_into_one_provider_call() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    let task = seed_task(&store).await;

    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
    });
    let cancel = CancellationToken::new();
    let (worker, handle) = EmbedWorker::new(store.clone(), provider.clone(), cancel.clone());
    let join = worker.spawn();

    for _ in 0..5 {
        handle.queue_job(EntityKind::Task, task.id);
    }

    // One debounce window plus slack.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    // The vector landed in the index.
    let index = EmbeddingIndex::new(store);
    let hits = index
        .search(EntityKind::Task, &[1.0, 0.0], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity_id, task.id);

    cancel.cancel();
    join.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn jobs_for_missing_entities_are_skipped() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();

    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
    });
    let cancel = CancellationToken::new();
    let (worker, handle) = EmbedWorker::new(store, provider.clone(), cancel.clone());
    let join = worker.spawn();

    handle.queue_job(EntityKind::Task, 9999);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    cancel.cancel();
    join.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_jobs_retry_then_drop() {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    let task = seed_task(&store).await;

    let provider = Arc::new(FailingProvider {
        calls: AtomicUsize::new(0),
    });
    let cancel = CancellationToken::new();
    let (worker, handle) = EmbedWorker::new(store, provider.clone(), cancel.clone());
    let join = worker.spawn();

    handle.queue_job(EntityKind::Task, task.id);
    // Debounce + the full 250 ms / 1 s / 4 s backoff ladder + slack.
    tokio::time::sleep(Duration::from_millis(7000)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);

    cancel.cancel();
    join.await.unwrap();
}
