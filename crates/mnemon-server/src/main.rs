//! mnemon-server - mnemon backend server
//!
//! REST API over the memory engine.

use mnemon_sdk::MemoryEngine;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod error;
mod routes;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; MNEMON_LOG_JSON=1 switches to JSON lines
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mnemon_server=info,mnemon_sdk=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("MNEMON_LOG_JSON").is_ok_and(|v| v == "1") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!("mnemon-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    let sdk_config = config.sdk_config()?;
    info!("Config loaded from {:?}", config.config_path);

    let builder = MemoryEngine::builder(sdk_config);
    #[cfg(feature = "fastembed")]
    let builder = builder.with_embedder(Arc::new(mnemon_sdk::memory::FastEmbedProvider::new()));
    let engine = Arc::new(builder.build()?);
    engine.initialize().await?;

    let state = Arc::new(state::AppState::new(engine.clone()));
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    engine.shutdown().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
