mod chat;
mod config;
mod routes;
mod state;
mod stats;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::chat::ChatConnection;
use crate::config::Config;
use crate::stats::{StatsApi, TrackerClient};

#[tokio::main]
async fn main() {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    config.validate().expect("invalid configuration");

    let chat = ChatConnection::shared(&config.connection_options());

    // Non-fatal: stats routes answer 503 without a client.
    let stats: Option<Arc<dyn StatsApi>> = match TrackerClient::new(&config.stats_base_url, config.stats_timeout()) {
        Ok(client) => {
            tracing::info!(base_url = %config.stats_base_url, "stats client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "stats client not configured; stats disabled");
            None
        }
    };

    let state = state::AppState::new(chat.clone(), stats, config.buffer_config(), config.default_channel.clone());
    let app = routes::app(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "streamboard listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(chat))
        .await
        .expect("server failed");
}

/// Wait for Ctrl-C, then close the upstream chat socket.
async fn shutdown(chat: ChatConnection) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
    chat.disconnect();
}
