//! Semantic index over projects, tasks and documents.
//!
//! - `provider`: the embedding backends (local deterministic, OpenAI, Azure)
//! - `index`: vector storage and cosine search on top of the store
//! - `worker`: the background task that keeps the index in sync
//!
//! Handlers never talk to a provider; they push `(kind, id)` jobs through an
//! [`EmbedHandle`] and move on. Index failures never fail the request that
//! caused them.

mod index;
mod provider;
mod worker;

#[cfg(test)]
mod worker_test;

pub use index::EmbeddingIndex;
pub use provider::{
    provider_from_config, AzureOpenAiProvider, EmbeddingProvider, LocalProvider, OpenAiProvider,
    ProviderError,
};
pub use worker::{EmbedHandle, EmbedWorker};
