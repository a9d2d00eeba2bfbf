//! Main Entrypoint for the Duologue API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Opening the transcript store under the data directory.
//! 3. Initializing the chat and speech provider clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use duologue_api::{config::Config, router::create_router, state::AppState, store::FsTranscriptStore};
use duologue_core::{
    llm_client::{ChatClient, OpenRouterClient},
    speech::SpeechSynthesizer,
    tts_client::GroqSpeechClient,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Transcript Store ---
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;
    let store = Arc::new(FsTranscriptStore::new(
        config.data_dir.clone(),
        config.public_base_url.clone(),
    ));
    info!(data_dir = %config.data_dir.display(), "Transcript store ready.");

    // --- 4. Initialize Provider Clients ---
    let chat: Arc<dyn ChatClient> = Arc::new(OpenRouterClient::new(
        config.openrouter_base_url.clone(),
        config.openrouter_api_key.clone(),
    ));
    if config.groq_api_key.is_none() {
        warn!("GROQ_API_KEY is not set. Text-to-speech requests will fail and playback falls back to a short pause.");
    }
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(GroqSpeechClient::new(
        config.groq_base_url.clone(),
        config.groq_api_key.clone(),
    ));

    let app_state = Arc::new(AppState {
        store,
        chat,
        synthesizer,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        bind_address = %config.bind_address,
        public_base_url = %config.public_base_url,
        "Service configured. Starting server..."
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
