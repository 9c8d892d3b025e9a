//! Application state for the API server.

use std::sync::Arc;

use crate::config::Config;
use crate::db::SqliteStore;
use crate::embedding::{EmbedHandle, EmbeddingIndex, EmbeddingProvider};

/// Shared application state. Cloned per request; every field is cheap to
/// clone.
#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub config: Arc<Config>,
    /// Queue handle to the embedding worker; handlers push jobs, never
    /// touch the provider.
    pub embed: EmbedHandle,
    /// Provider used to embed search queries on the request path.
    pub provider: Arc<dyn EmbeddingProvider>,
}

impl AppState {
    pub fn new(
        store: SqliteStore,
        config: Arc<Config>,
        embed: EmbedHandle,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            config,
            embed,
            provider,
        }
    }

    pub fn index(&self) -> EmbeddingIndex {
        EmbeddingIndex::new(self.store.clone())
    }
}
