mod config;
mod error;
mod store;
mod registry;
mod prober;
mod api;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::prober::Prober;
use crate::registry::{Registry, RegistryHandle};
use crate::store::{db::RecordStore, hash};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("service_pollerd=info,tower_http=info"))
        )
        .init();

    tracing::info!("Starting service-pollerd");

    // Config file is optional; built-in defaults apply without one
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            tracing::info!("Loaded config from {}", path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };
    config.apply_env()?;

    let store = RecordStore::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    let initial_digest = hash::compute_digest(&store.get_all().context("Failed to read services")?);
    let (digest_tx, _) = watch::channel(initial_digest);

    let registry = RegistryHandle::spawn(Registry::new(store, digest_tx));

    let cancel = CancellationToken::new();

    // Spawn the poll loop
    let prober = Prober::new(registry.clone(), &config.poller)?;
    let poll_cancel = cancel.clone();
    let poll_interval = config.poller.interval();
    let poller_handle = tokio::spawn(async move {
        if let Err(e) = prober::run(prober, poll_interval, poll_cancel).await {
            tracing::error!("Poller error: {}", e);
        }
    });

    let app = api::routes::router(api::routes::AppState {
        registry: registry.clone(),
        digest_rx: registry.subscribe_digest(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");
    cancel.cancel();

    // Poller and server drain before the registry goes away
    let _ = tokio::join!(poller_handle, server_handle);

    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
