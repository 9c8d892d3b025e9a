//! The background indexing worker.
//!
//! Handlers push `(kind, id)` jobs through an [`EmbedHandle`]; the worker
//! debounces, deduplicates and embeds them off the request path. A flush
//! window coalesces repeated writes to the same entity into one provider
//! call. The queue is bounded; under pressure the oldest job is dropped and
//! counted rather than blocking a request handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use std::sync::Mutex;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EmbeddingIndex, EmbeddingProvider};
use crate::db::{EntityKind, Id, SqliteStore};

const QUEUE_CAPACITY: usize = 1024;
const DEBOUNCE: Duration = Duration::from_millis(250);
const BACKOFF: [Duration; 3] = [
    Duration::from_millis(250),
    Duration::from_secs(1),
    Duration::from_secs(4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Job {
    kind: EntityKind,
    id: Id,
}

struct Queue {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl Queue {
    // The lock only guards short queue operations; a poisoned guard still
    // holds a usable queue.
    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Cheap handle handed to request handlers.
#[derive(Clone)]
pub struct EmbedHandle {
    queue: Arc<Queue>,
}

impl EmbedHandle {
    /// Enqueue a re-index job. Never blocks and never fails; when the queue
    /// is full the oldest job gives way.
    pub fn queue_job(&self, kind: EntityKind, id: Id) {
        let job = Job { kind, id };
        {
            let mut jobs = self.queue.lock_jobs();
            if jobs.len() == QUEUE_CAPACITY {
                jobs.pop_front();
                self.queue.dropped.fetch_add(1, Ordering::Relaxed);
            }
            jobs.push_back(job);
        }
        self.queue.notify.notify_one();
    }

    /// Jobs discarded due to overflow since startup.
    pub fn dropped_jobs(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Jobs waiting for the next flush.
    pub fn pending_jobs(&self) -> usize {
        self.queue.lock_jobs().len()
    }
}

pub struct EmbedWorker {
    index: EmbeddingIndex,
    provider: Arc<dyn EmbeddingProvider>,
    queue: Arc<Queue>,
    cancel: CancellationToken,
}

impl EmbedWorker {
    /// Build the worker and its handle. Call [`EmbedWorker::run`] (usually
    /// via `tokio::spawn`) to start processing.
    pub fn new(
        store: SqliteStore,
        provider: Arc<dyn EmbeddingProvider>,
        cancel: CancellationToken,
    ) -> (Self, EmbedHandle) {
        let queue = Arc::new(Queue {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        let handle = EmbedHandle {
            queue: queue.clone(),
        };
        (
            Self {
                index: EmbeddingIndex::new(store),
                provider,
                queue,
                cancel,
            },
            handle,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(provider = self.provider.name(), "embedding worker started");
        loop {
            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = self.cancel.cancelled() => break,
            }

            // Debounce: let rapid-fire writes to the same entity pile up,
            // then flush the batch deduplicated.
            tokio::time::sleep(DEBOUNCE).await;
            self.flush().await;
        }

        // Drain whatever arrived before the shutdown signal.
        self.flush().await;
        info!("embedding worker stopped");
    }

    async fn flush(&self) {
        let batch: Vec<Job> = {
            let mut jobs = self.queue.lock_jobs();
            jobs.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }

        // Keep first-seen order, drop repeats.
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<Job> = batch.into_iter().filter(|j| seen.insert(*j)).collect();
        debug!(jobs = unique.len(), "flushing embedding batch");

        for job in unique {
            self.process(job).await;
        }
    }

    async fn process(&self, job: Job) {
        let text = match self.index.entity_text(job.kind, job.id).await {
            Ok(Some(text)) => text,
            Ok(None) => return, // entity deleted since enqueue
            Err(e) => {
                warn!(kind = %job.kind, id = job.id, error = %e, "cannot load entity for indexing");
                return;
            }
        };

        // One initial attempt plus a retry per backoff entry.
        let mut attempt = 0;
        loop {
            match self.provider.embed(&text).await {
                Ok(vector) => {
                    if let Err(e) = self
                        .index
                        .upsert(job.kind, job.id, &vector, self.provider.name())
                        .await
                    {
                        warn!(kind = %job.kind, id = job.id, error = %e, "cannot store embedding");
                    }
                    return;
                }
                Err(e) => {
                    let Some(backoff) = BACKOFF.get(attempt) else {
                        warn!(kind = %job.kind, id = job.id, error = %e,
                            "dropping embedding job after final retry");
                        return;
                    };
                    attempt += 1;
                    debug!(kind = %job.kind, id = job.id, attempt, error = %e,
                        "embedding attempt failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(*backoff) => {}
                        _ = self.cancel.cancelled() => return,
                    }
                }
            }
        }
    }
}
