use agent_memory::{
    api::{build_router, AppState},
    config::Config,
    context::ContextCompressor,
    logging::init_tracing,
    memory::{JsonFileStorage, SessionMemoryStore, SessionStorage},
};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load(Some("config")).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    let storage: Arc<dyn SessionStorage> = Arc::new(
        JsonFileStorage::open(&config.memory.storage_dir)
            .await
            .context("Failed to open session storage")?,
    );
    let compressor = Arc::new(ContextCompressor::from_config(&config.compressor));
    let store = Arc::new(
        SessionMemoryStore::load(storage, compressor.clone(), config.memory.clone())
            .await
            .context("Failed to load sessions")?,
    );

    let state = AppState {
        store,
        compressor,
        chunker: config.chunker.clone(),
    };
    let app = build_router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("agent-memory listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
