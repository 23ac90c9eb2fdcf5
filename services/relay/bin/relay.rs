//! Main Entrypoint for the Live Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the system preamble sent with every session setup.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use live_relay::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Reads the system preamble. A missing file means no preamble.
fn load_system_prompt(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        warn!(path = %path.display(), "System prompt file not found. Sessions will start without a preamble.");
        return Ok(String::new());
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read system prompt from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    if config.gemini_api_key.is_none() && config.gemini_bearer_token.is_none() {
        warn!("No upstream credential configured. Every session will fail until one is set.");
    }

    // --- 2. Load the system preamble ---
    let system_prompt = load_system_prompt(&config.system_prompt_path)?;
    let app_state = Arc::new(
        AppState::new(config.clone(), system_prompt)
            .context("Failed to initialize application state")?,
    );

    // --- 3. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 4. Start Server ---
    info!(
        model = ?config.live_model,
        setup_timeout_secs = config.setup_timeout.as_secs(),
        bind_address = %config.bind_address,
        "Relay configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
