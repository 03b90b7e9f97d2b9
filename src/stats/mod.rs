//! Player stats — the competitive-profile lookup behind `/api/valorant`.
//!
//! DESIGN
//! ======
//! Independent of the chat subsystem; the two only share the HTTP shell.
//! Routes depend on the `StatsApi` trait so they can be tested with a canned
//! implementation; `TrackerClient` is the real one. Every failure is an
//! `ApiError` carrying a user-facing message and the HTTP status to return.

pub mod tracker;

use serde::Serialize;

pub use tracker::TrackerClient;

/// Fallback when the upstream status has no fixed message.
const UNKNOWN_ERROR: &str = "An unknown error occurred.";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl ApiError {
    /// Map an upstream HTTP status to its fixed user-facing message.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        let message = match status {
            400 => "Invalid request. Please check the player name and tag.",
            401 => "Unauthorized. Please check your API credentials.",
            403 => "Forbidden. Access denied.",
            404 => "Player not found.",
            429 => "Too many requests. Please try again later.",
            500 => "Internal server error. Please try again later.",
            503 => "Service unavailable. Please try again later.",
            _ => UNKNOWN_ERROR,
        };
        Self { message: message.to_owned(), status }
    }

    /// A failure on our side of the call (network, decoding, missing data).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: 500 }
    }
}

// =============================================================================
// QUERY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub name: String,
    pub tag: String,
    /// Game mode, e.g. `auto`, `competitive`, `spike rush`.
    pub mode: String,
    /// Act id to report on; `None` means the current season.
    pub season: Option<String>,
}

impl ProfileQuery {
    /// True when the query asks for the standard (current-season) profile.
    #[must_use]
    pub fn is_current_season(&self) -> bool {
        self.mode.eq_ignore_ascii_case("auto") || self.season.is_none()
    }
}

/// Upstream playlist name for a display mode. Unknown modes pass through
/// lower-cased.
#[must_use]
pub fn playlist_for_mode(mode: &str) -> String {
    let mode = mode.to_lowercase();
    let playlist = match mode.as_str() {
        "auto" | "competitive" => "competitive",
        "unrated" => "unrated",
        "swiftplay" => "swiftplay",
        "spike rush" => "spikerush",
        "deathmatch" => "deathmatch",
        "escalation" => "escalation",
        "team deathmatch" => "team-deathmatch",
        "replication" => "replication",
        "snowball fight" => "snowball",
        _ => return mode,
    };
    playlist.to_owned()
}

// =============================================================================
// RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    #[serde(rename = "platformInfo")]
    pub platform: PlatformInfo,
    pub stats: Option<PlayerStats>,
    pub available_seasons: Vec<SeasonSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub platform_user_handle: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub time_played: StatValue,
    pub matches_played: StatValue,
    pub rank: RankValue,
    pub peak_rank: RankValue,
    pub damage_per_round: StatValue,
    #[serde(rename = "kDRatio")]
    pub kd_ratio: StatValue,
    pub headshots_percentage: StatValue,
    pub matches_win_pct: StatValue,
    pub matches_won: StatValue,
    pub matches_lost: StatValue,
    pub trn_performance_score: StatValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatValue {
    pub display_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankValue {
    pub tier_name: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonSummary {
    pub id: String,
    pub name: String,
}

/// One act from the season report, with its stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonReport {
    pub id: String,
    pub name: String,
    pub stats: PlayerStats,
}

// =============================================================================
// API
// =============================================================================

#[async_trait::async_trait]
pub trait StatsApi: Send + Sync {
    /// Profile for one player, for the current season or a specific act.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] with the status the caller should surface.
    async fn profile(&self, query: &ProfileQuery) -> Result<PlayerProfile, ApiError>;

    /// Every act in the season report for `mode`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] with the status the caller should surface.
    async fn season_report(&self, name: &str, tag: &str, mode: &str) -> Result<Vec<SeasonReport>, ApiError>;
}
