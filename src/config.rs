//! Process configuration from flags, environment, and `.env`.
//!
//! Every setting has a `--flag` and an environment variable; `main` loads
//! `.env` first so both see it. `validate` rejects values that would make
//! the chat or stats subsystems misbehave rather than fail loudly.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::chat::buffer::BufferConfig;
use crate::chat::connection::{ConnectionOptions, DEFAULT_CHAT_URL, anonymous_nick};
use crate::chat::normalize_channel;
use crate::chat::reconnect::ReconnectPolicy;
use crate::stats::tracker::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("CHAT_RECONNECT_MAX_MS ({max}) is below CHAT_RECONNECT_DELAY_MS ({initial})")]
    BackoffRange { initial: u64, max: u64 },
    #[error("invalid default channel: {0:?}")]
    Channel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReconnectMode {
    Never,
    Fixed,
    Backoff,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "streamboard", about = "Live stream chat viewer and player stats proxy")]
pub struct Config {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Upstream chat socket.
    #[arg(long, env = "CHAT_URL", default_value = DEFAULT_CHAT_URL)]
    pub chat_url: String,

    /// Channel a viewer joins when it does not name one.
    #[arg(long, env = "CHAT_DEFAULT_CHANNEL", default_value = "sodapoppin")]
    pub default_channel: String,

    #[arg(long, env = "CHAT_PING_SECS", default_value_t = 20)]
    pub ping_secs: u64,

    #[arg(long, env = "CHAT_RECONNECT", value_enum, default_value_t = ReconnectMode::Backoff)]
    pub reconnect: ReconnectMode,

    /// Fixed delay, or the first backoff delay.
    #[arg(long, env = "CHAT_RECONNECT_DELAY_MS", default_value_t = 1000)]
    pub reconnect_delay_ms: u64,

    #[arg(long, env = "CHAT_RECONNECT_MAX_MS", default_value_t = 30_000)]
    pub reconnect_max_ms: u64,

    /// Visible and pending message cap per viewer.
    #[arg(long, env = "CHAT_BUFFER_CAPACITY", default_value_t = 200)]
    pub buffer_capacity: usize,

    #[arg(long, env = "STATS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub stats_base_url: String,

    #[arg(long, env = "STATS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub stats_timeout_secs: u64,

    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,
}

impl Config {
    /// # Errors
    ///
    /// Returns the first setting that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("CHAT_PING_SECS", self.ping_secs),
            ("STATS_TIMEOUT_SECS", self.stats_timeout_secs),
            ("CHAT_BUFFER_CAPACITY", u64::try_from(self.buffer_capacity).unwrap_or(u64::MAX)),
        ];
        if let Some((name, _)) = nonzero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { name });
        }

        match self.reconnect {
            ReconnectMode::Never => {}
            ReconnectMode::Fixed | ReconnectMode::Backoff if self.reconnect_delay_ms == 0 => {
                return Err(ConfigError::Zero { name: "CHAT_RECONNECT_DELAY_MS" });
            }
            ReconnectMode::Backoff if self.reconnect_max_ms < self.reconnect_delay_ms => {
                return Err(ConfigError::BackoffRange { initial: self.reconnect_delay_ms, max: self.reconnect_max_ms });
            }
            ReconnectMode::Fixed | ReconnectMode::Backoff => {}
        }

        normalize_channel(&self.default_channel).map_err(|_| ConfigError::Channel(self.default_channel.clone()))?;
        Ok(())
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_millis(self.reconnect_delay_ms);
        match self.reconnect {
            ReconnectMode::Never => ReconnectPolicy::Never,
            ReconnectMode::Fixed => ReconnectPolicy::Fixed { delay },
            ReconnectMode::Backoff => {
                ReconnectPolicy::Backoff { initial: delay, max: Duration::from_millis(self.reconnect_max_ms) }
            }
        }
    }

    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            url: self.chat_url.clone(),
            ping_interval: Duration::from_secs(self.ping_secs),
            reconnect: self.reconnect_policy(),
            nick: anonymous_nick(),
        }
    }

    #[must_use]
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            capacity: self.buffer_capacity,
            pending_capacity: self.buffer_capacity,
            ..BufferConfig::default()
        }
    }

    #[must_use]
    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
