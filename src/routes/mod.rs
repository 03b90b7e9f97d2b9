//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the chat websocket, chat lifecycle endpoints, and the stats proxy
//! under one Axum router. Static viewer assets are served from the
//! configured directory as the fallback.
//!
//! JSON endpoints are compressed when the client accepts it. The websocket
//! route is added after the compression layer so upgrade responses are left
//! untouched.

pub mod chat;
pub mod stats;

use std::path::Path;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// JSON API routes, compressed.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat/connect", post(chat::connect))
        .route("/api/chat/disconnect", post(chat::disconnect))
        .route("/api/chat/status", get(chat::status))
        .route("/api/valorant/profile", get(stats::profile))
        .route("/api/valorant/profile/explicit", get(stats::season_report))
        .route("/healthz", get(healthz))
        .layer(CompressionLayer::new())
}

/// Full application: API, chat websocket, and static viewer.
pub fn app(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let viewer = ServeDir::new(static_dir).append_index_html_on_directories(true);

    api_routes()
        .route("/api/chat/ws", get(chat::handle_ws))
        .fallback_service(viewer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
