//! Live chat subsystem — upstream socket, protocol parsing, and the
//! scroll-aware message buffer that feeds the render surface.
//!
//! ARCHITECTURE
//! ============
//! Data flows one way:
//!
//! ```text
//! wire frames → connection (fan-out) → message::decode_line → feed → buffer → render
//! ```
//!
//! Control flows back only for channel switches (`feed` → `connection`) and
//! scroll/resume commands (browser → `feed` → `buffer`).
//!
//! OWNERSHIP
//! =========
//! The connection is a process-wide singleton shared by every viewer. Feeds
//! and buffers are per-viewer and die with the viewer; dropping a feed never
//! closes the shared socket.

pub mod badge;
pub mod buffer;
pub mod connection;
pub mod feed;
pub mod message;
pub mod reconnect;
pub mod render;
pub mod transport;

pub use connection::{ChatConnection, ConnectionOptions, ConnectionState};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket error: {0}")]
    Socket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("transport failed: {0}")]
    Transport(String),
}

// =============================================================================
// CHANNEL NAMES
// =============================================================================

/// Normalize a user-supplied channel name: trimmed, lower-cased, no `#`.
///
/// Only login characters are accepted so a name can never smuggle extra
/// protocol lines into a JOIN/PART frame.
///
/// # Errors
///
/// Returns `ChatError::InvalidChannel` for empty names or names containing
/// anything other than ASCII alphanumerics and `_`.
pub fn normalize_channel(raw: &str) -> Result<String, ChatError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('#').unwrap_or(trimmed).to_ascii_lowercase();
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid { Ok(name) } else { Err(ChatError::InvalidChannel(raw.to_owned())) }
}
