//! Taskgrid server binary.
//!
//! Wires the store, the embedding worker and the HTTP router together; the
//! library stays agnostic of process concerns like signals and logging.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskgrid::api::{create_router, AppState};
use taskgrid::config::{Config, ConfigError};
use taskgrid::db::{DbError, SqliteStore};
use taskgrid::embedding::{provider_from_config, EmbedWorker, ProviderError};

#[derive(Error, Diagnostic, Debug)]
enum ServerError {
    #[error("configuration error: {0}")]
    #[diagnostic(code(taskgrid::server::config))]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    #[diagnostic(code(taskgrid::server::database))]
    Database(#[from] DbError),

    #[error("embedding provider error: {0}")]
    #[diagnostic(code(taskgrid::server::provider))]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    #[diagnostic(code(taskgrid::server::io))]
    Io(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "taskgrid")]
#[command(author, version, about = "Headless project management backend", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host address to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskgrid=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.storage.upload_dir)?;

    info!(path = %db_path.display(), "opening database");
    let store = SqliteStore::open(&db_path).await?;
    store.migrate().await?;

    let provider = provider_from_config(&config.embedding)?;
    let cancel = CancellationToken::new();
    let (worker, embed) = EmbedWorker::new(store.clone(), provider.clone(), cancel.clone());
    let worker_handle = worker.spawn();

    if config.admin_api_token.is_none() {
        info!("no admin token configured; token administration is disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(store, Arc::new(config), embed, provider);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Let the worker drain its queue before the process exits.
    cancel.cancel();
    let _ = worker_handle.await;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    cancel.cancel();
}
