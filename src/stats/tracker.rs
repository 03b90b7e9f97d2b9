//! tracker.network client.
//!
//! Thin HTTP wrapper over the standard profile and season-report endpoints.
//! Response shaping lives in pure `parse_*` functions for testability.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    ApiError, PlatformInfo, PlayerProfile, PlayerStats, ProfileQuery, RankValue, SeasonReport, SeasonSummary,
    StatValue, StatsApi, playlist_for_mode,
};

pub const DEFAULT_BASE_URL: &str = "https://api.tracker.network/api/v2/valorant/standard";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SOURCE: &str = "overwolf-2";
const SEASON_SEGMENT: &str = "season";
const UNRANKED: &str = "Unranked";

// =============================================================================
// CLIENT
// =============================================================================

pub struct TrackerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TrackerClient {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::internal(format!("invalid stats base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::internal(format!("invalid stats base url: {base_url}")));
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self { http, base_url })
    }

    /// `{base}/profile/riot/{name#tag}[/segments/season-report]`
    fn url(&self, name: &str, tag: &str, playlist: Option<&str>) -> Url {
        let handle = format!("{name}#{tag}");
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["profile", "riot", handle.as_str()]);
            if playlist.is_some() {
                segments.extend(["segments", "season-report"]);
            }
        }
        {
            let mut query = url.query_pairs_mut();
            if let Some(playlist) = playlist {
                query.append_pair("playlist", playlist);
            }
            query.append_pair("source", SOURCE).append_pair("s", "1");
        }
        url
    }

    async fn fetch(&self, url: Url) -> Result<String, ApiError> {
        debug!(%url, "stats: request");
        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(error = %e, "stats: request failed");
            ApiError::internal(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "stats: upstream error");
            return Err(ApiError::from_status(status.as_u16()));
        }
        response.text().await.map_err(|e| ApiError::internal(e.to_string()))
    }
}

#[async_trait::async_trait]
impl StatsApi for TrackerClient {
    async fn profile(&self, query: &ProfileQuery) -> Result<PlayerProfile, ApiError> {
        let standard = parse_standard(&self.fetch(self.url(&query.name, &query.tag, None)).await?)?;
        let seasons = available_seasons(&standard);

        match query.season.as_deref() {
            Some(act) if !query.is_current_season() => {
                let playlist = playlist_for_mode(&query.mode);
                let url = self.url(&query.name, &query.tag, Some(&playlist));
                let report = parse_report(&self.fetch(url).await?)?;
                profile_for_act(report, act, seasons)
            }
            _ => current_profile(standard, seasons),
        }
    }

    async fn season_report(&self, name: &str, tag: &str, mode: &str) -> Result<Vec<SeasonReport>, ApiError> {
        let playlist = playlist_for_mode(mode);
        let report = parse_report(&self.fetch(self.url(name, tag, Some(&playlist))).await?)?;
        Ok(report_seasons(&report))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    data: Option<RawProfileData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfileData {
    #[serde(default)]
    platform_info: Option<RawPlatformInfo>,
    #[serde(default)]
    segments: Option<Vec<RawSegment>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlatformInfo {
    #[serde(default)]
    platform_user_handle: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSegment {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    attributes: Option<RawAttributes>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    stats: Option<HashMap<String, RawStat>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttributes {
    #[serde(default)]
    act: Option<String>,
    #[serde(default)]
    season: Option<RawSeason>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSeason {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tier_name: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStat {
    #[serde(default)]
    display_value: Option<String>,
    #[serde(default)]
    percentile: Option<f64>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    #[serde(default)]
    data: Option<Vec<RawSegment>>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_standard(json: &str) -> Result<RawProfileData, ApiError> {
    let raw: RawProfile = serde_json::from_str(json).map_err(|e| ApiError::internal(format!("parse failed: {e}")))?;
    raw.data
        .filter(|data| data.segments.is_some())
        .ok_or_else(|| ApiError::internal("Invalid response data structure"))
}

fn parse_report(json: &str) -> Result<Vec<RawSegment>, ApiError> {
    let raw: RawReport = serde_json::from_str(json).map_err(|e| ApiError::internal(format!("parse failed: {e}")))?;
    raw.data.ok_or_else(|| ApiError::internal("Invalid season report data"))
}

/// Seasons listed on the standard profile, newest id first.
fn available_seasons(data: &RawProfileData) -> Vec<SeasonSummary> {
    let mut seasons: Vec<SeasonSummary> = data
        .segments
        .iter()
        .flatten()
        .filter(|segment| segment.kind.as_deref() == Some(SEASON_SEGMENT))
        .filter_map(|segment| {
            let season = segment.attributes.as_ref()?.season.as_ref()?;
            Some(SeasonSummary { id: season.id.clone()?, name: season.name.clone()? })
        })
        .collect();
    seasons.sort_by(|a, b| b.id.cmp(&a.id));
    seasons
}

fn current_profile(data: RawProfileData, available_seasons: Vec<SeasonSummary>) -> Result<PlayerProfile, ApiError> {
    let stats = data
        .segments
        .iter()
        .flatten()
        .find(|segment| segment.kind.as_deref() == Some(SEASON_SEGMENT))
        .and_then(|segment| segment.stats.as_ref())
        .ok_or_else(|| ApiError::internal("No season data found"))?;

    let platform = data.platform_info.unwrap_or_default();
    Ok(PlayerProfile {
        platform: PlatformInfo {
            platform_user_handle: platform.platform_user_handle.unwrap_or_default(),
            avatar_url: platform.avatar_url.unwrap_or_default(),
        },
        stats: Some(player_stats(stats)),
        available_seasons,
    })
}

fn profile_for_act(
    report: Vec<RawSegment>,
    act: &str,
    available_seasons: Vec<SeasonSummary>,
) -> Result<PlayerProfile, ApiError> {
    let season = report
        .into_iter()
        .filter(|season| season_name(season).is_some() && season.stats.is_some())
        .find(|season| season.attributes.as_ref().and_then(|a| a.act.as_deref()) == Some(act))
        .ok_or_else(|| ApiError::internal("No season data found"))?;

    Ok(PlayerProfile {
        platform: PlatformInfo {
            platform_user_handle: season_name(&season).unwrap_or_default().to_owned(),
            avatar_url: String::new(),
        },
        stats: season.stats.as_ref().map(player_stats),
        available_seasons,
    })
}

fn report_seasons(report: &[RawSegment]) -> Vec<SeasonReport> {
    report
        .iter()
        .filter_map(|season| {
            Some(SeasonReport {
                id: season.attributes.as_ref()?.act.clone().filter(|act| !act.is_empty())?,
                name: season_name(season)?.to_owned(),
                stats: player_stats(season.stats.as_ref()?),
            })
        })
        .collect()
}

fn season_name(segment: &RawSegment) -> Option<&str> {
    segment
        .metadata
        .as_ref()
        .and_then(|m| m.name.as_deref())
        .filter(|name| !name.is_empty())
}

fn player_stats(stats: &HashMap<String, RawStat>) -> PlayerStats {
    let stat = |key: &str| stat_value(stats.get(key));
    let rank = |key: &str| rank_value(stats.get(key));
    PlayerStats {
        time_played: stat("timePlayed"),
        matches_played: stat("matchesPlayed"),
        rank: rank("rank"),
        peak_rank: rank("peakRank"),
        damage_per_round: stat("damagePerRound"),
        kd_ratio: stat("kDRatio"),
        headshots_percentage: stat("headshotsPercentage"),
        matches_win_pct: stat("matchesWinPct"),
        matches_won: stat("matchesWon"),
        matches_lost: stat("matchesLost"),
        trn_performance_score: stat("trnPerformanceScore"),
    }
}

fn stat_value(raw: Option<&RawStat>) -> StatValue {
    StatValue {
        display_value: raw.and_then(|s| s.display_value.clone()).unwrap_or_else(|| "0".to_owned()),
        percentile: raw.and_then(|s| s.percentile),
    }
}

fn rank_value(raw: Option<&RawStat>) -> RankValue {
    let metadata = raw.and_then(|s| s.metadata.as_ref());
    RankValue {
        tier_name: metadata.and_then(|m| m.tier_name.clone()).unwrap_or_else(|| UNRANKED.to_owned()),
        icon_url: metadata.and_then(|m| m.icon_url.clone()).unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
