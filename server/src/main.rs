use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shared::config::{load_config, validate_config};
use shared::types::server_config::{AppConfig, StorageBackend};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::AppState;
use server::database::{
    ConnectionLocks, KvUserStore, MemoryUserStore, SqliteUserStore, TimedStore, UserStore,
};
use server::handlers::http::build_router;
use server::serve::serve;

#[derive(Parser, Debug)]
#[command(name = "tokengate", about = "Bearer-token user API")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "TOKENGATE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Overrides `storage.backend` (memory, kv or sqlite).
    #[arg(long)]
    backend: Option<StorageBackend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    if let Some(backend) = args.backend {
        config.storage.backend = backend;
        validate_config(&config).context("Config invalid after backend override")?;
    }

    let locks = ConnectionLocks::new();
    let store = open_store(&config, &locks).await?;

    let state = AppState::from_config(&config, store)?;
    let router = Arc::new(build_router());

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(
        "Listening on http://{} ({} storage)",
        addr, config.storage.backend
    );

    serve(
        listener,
        router,
        state,
        Duration::from_secs(config.server.request_timeout_secs),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        },
    )
    .await?;

    locks.clear();
    info!("Server closed");
    Ok(())
}

async fn open_store(config: &AppConfig, locks: &ConnectionLocks) -> Result<Arc<dyn UserStore>> {
    let storage = &config.storage;
    let path = storage.path.clone().unwrap_or_default();

    let inner: Arc<dyn UserStore> = match storage.backend {
        StorageBackend::Memory => Arc::new(MemoryUserStore::new()),
        StorageBackend::Kv => Arc::new(
            KvUserStore::open(&path)
                .with_context(|| format!("Failed to open key-value store at {}", path))?,
        ),
        StorageBackend::Sqlite => Arc::new(
            SqliteUserStore::open(&path, storage.max_connections, locks)
                .await
                .with_context(|| format!("Failed to open sqlite store at {}", path))?,
        ),
    };

    Ok(Arc::new(TimedStore::new(
        inner,
        Duration::from_secs(storage.operation_timeout_secs),
    )))
}
