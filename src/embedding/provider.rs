//! Embedding backends behind one async trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Error, Diagnostic, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {message}")]
    #[diagnostic(code(taskgrid::embedding::request))]
    Request { message: String },

    #[error("provider returned an unusable response: {message}")]
    #[diagnostic(code(taskgrid::embedding::response))]
    Response { message: String },

    #[error("provider '{provider}' needs {name} configured")]
    #[diagnostic(code(taskgrid::embedding::config))]
    MissingSetting {
        provider: &'static str,
        name: &'static str,
    },
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
}

/// Build the configured provider.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "azure_openai" => Ok(Arc::new(AzureOpenAiProvider::new(config)?)),
        _ => Ok(Arc::new(LocalProvider::new(config.dimension))),
    }
}

// =============================================================================
// Local
// =============================================================================

/// Deterministic hash-derived vectors. No network, stable across runs, good
/// enough for tests and offline deployments.
pub struct LocalProvider {
    dimension: usize,
}

impl LocalProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            for chunk in hasher.finalize().chunks_exact(4) {
                if vector.len() == self.dimension {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map into [-1, 1).
                vector.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn name(&self) -> &str {
        "local"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// =============================================================================
// Remote
// =============================================================================

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

fn build_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Request {
            message: e.to_string(),
        })
}

async fn parse_embedding(response: reqwest::Response) -> Result<Vec<f32>, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Request {
            message: format!("status {}: {}", status, body),
        });
    }
    let parsed: EmbeddingResponse = response.json().await.map_err(|e| ProviderError::Response {
        message: e.to_string(),
    })?;
    parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or(ProviderError::Response {
            message: "empty data array".to_string(),
        })
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingSetting {
                provider: "openai",
                name: "api_key",
            })?;
        Ok(Self {
            client: build_client()?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            api_key,
            model: config
                .deployment_name
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                message: e.to_string(),
            })?;
        parse_embedding(response).await
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    dimension: usize,
}

impl AzureOpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ProviderError::MissingSetting {
                provider: "azure_openai",
                name: "endpoint",
            })?;
        let deployment = config
            .deployment_name
            .clone()
            .ok_or(ProviderError::MissingSetting {
                provider: "azure_openai",
                name: "deployment_name",
            })?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingSetting {
                provider: "azure_openai",
                name: "api_key",
            })?;

        Ok(Self {
            client: build_client()?,
            url: format!(
                "{}/openai/deployments/{}/embeddings?api-version=2023-05-15",
                endpoint.trim_end_matches('/'),
                deployment
            ),
            api_key,
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                message: e.to_string(),
            })?;
        parse_embedding(response).await
    }

    fn name(&self) -> &str {
        "azure_openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
