//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds a handle to the one shared chat connection, the per-viewer buffer
//! tunables, and the optional stats client. Clone is required by Axum; every
//! field is a cheap handle.

use std::sync::Arc;

use crate::chat::ChatConnection;
use crate::chat::buffer::BufferConfig;
use crate::stats::StatsApi;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatConnection,
    /// `None` when the stats client could not be built; stats routes answer 503.
    pub stats: Option<Arc<dyn StatsApi>>,
    pub buffer: BufferConfig,
    pub default_channel: String,
}

impl AppState {
    #[must_use]
    pub fn new(
        chat: ChatConnection,
        stats: Option<Arc<dyn StatsApi>>,
        buffer: BufferConfig,
        default_channel: impl Into<String>,
    ) -> Self {
        Self { chat, stats, buffer, default_channel: default_channel.into() }
    }
}
