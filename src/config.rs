//! Runtime configuration.
//!
//! Settings come from an optional JSON file plus the environment; where both
//! supply a value, the environment wins.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::db::Id;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    #[diagnostic(code(taskgrid::config::read))]
    Read { path: String, message: String },

    #[error("cannot parse config file {path}: {message}")]
    #[diagnostic(code(taskgrid::config::parse))]
    Parse { path: String, message: String },

    #[error("invalid value for {name}: {message}")]
    #[diagnostic(code(taskgrid::config::invalid))]
    Invalid { name: String, message: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Static admin token; grants every scope when presented.
    #[serde(default)]
    pub admin_api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// `local`, `openai` or `azure_openai`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub deployment_name: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8424
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_provider() -> String {
    "local".to_string()
}
fn default_dimension() -> usize {
    384
}
fn default_workers() -> usize {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}
impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            api_key: None,
            deployment_name: None,
            dimension: default_dimension(),
            workers: default_workers(),
        }
    }
}

impl Config {
    /// Load from an optional JSON file, then let the environment override.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT".into(),
                message: format!("not a port number: {}", port),
            })?;
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            self.database.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(endpoint) = std::env::var("EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Ok(name) = std::env::var("EMBEDDING_DEPLOYMENT_NAME") {
            self.embedding.deployment_name = Some(name);
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIMENSION") {
            self.embedding.dimension = dim.parse().map_err(|_| ConfigError::Invalid {
                name: "EMBEDDING_DIMENSION".into(),
                message: format!("not a number: {}", dim),
            })?;
        }
        if let Ok(workers) = std::env::var("EMBEDDING_WORKERS") {
            self.embedding.workers = workers.parse().map_err(|_| ConfigError::Invalid {
                name: "EMBEDDING_WORKERS".into(),
                message: format!("not a number: {}", workers),
            })?;
        }
        if let Ok(token) = std::env::var("ADMIN_API_TOKEN") {
            self.admin_api_token = Some(token);
        }

        match self.embedding.provider.as_str() {
            "local" | "openai" | "azure_openai" => Ok(()),
            other => Err(ConfigError::Invalid {
                name: "embedding.provider".into(),
                message: format!("unknown provider: {}", other),
            }),
        }
    }

    /// Path of the database file under the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.data_dir.join("db").join("projects.db")
    }

    /// Relative storage path for an attachment. The filename is sanitized
    /// before it touches the filesystem.
    pub fn attachment_path(project_id: Id, task_id: Id, filename: &str) -> String {
        let safe = sanitize_filename::sanitize(filename);
        format!("project_{}/task_{}/{}_{}", project_id, task_id, task_id, safe)
    }
}
