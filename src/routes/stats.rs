//! Stats routes — player profile proxy.
//!
//! Responses use one envelope: `{"status":"success","data":...}` or
//! `{"status":"error","error":"..."}` with the HTTP status from the
//! `ApiError`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;
use crate::stats::{ApiError, ProfileQuery};

const DEFAULT_MODE: &str = "auto";
const DEFAULT_REPORT_MODE: &str = "competitive";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileParams {
    pub name: Option<String>,
    pub tag: Option<String>,
    pub mode: Option<String>,
    pub season_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub name: Option<String>,
    pub tag: Option<String>,
    pub gamemode: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<T> {
    Success { data: T },
    Error { error: String },
}

fn success<T: Serialize>(data: T) -> Response {
    Json(Envelope::Success { data }).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(Envelope::<()>::Error { error: message.into() })).into_response()
}

fn api_failure(err: ApiError) -> Response {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    failure(status, err.message)
}

/// Both parts of the Riot id, trimmed and non-empty.
fn riot_id(name: Option<String>, tag: Option<String>) -> Option<(String, String)> {
    let name = name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty())?;
    let tag = tag.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())?;
    Some((name, tag))
}

fn unavailable() -> Response {
    failure(StatusCode::SERVICE_UNAVAILABLE, "Stats service unavailable")
}

fn missing_id() -> Response {
    failure(StatusCode::BAD_REQUEST, "Name and tag are required")
}

pub async fn profile(State(state): State<AppState>, Query(params): Query<ProfileParams>) -> Response {
    let Some((name, tag)) = riot_id(params.name, params.tag) else {
        return missing_id();
    };
    let Some(stats) = state.stats.as_ref() else {
        return unavailable();
    };

    let query = ProfileQuery {
        name,
        tag,
        mode: params.mode.filter(|m| !m.is_empty()).unwrap_or_else(|| DEFAULT_MODE.to_owned()),
        season: params.season_id.filter(|s| !s.is_empty()),
    };
    info!(name = %query.name, mode = %query.mode, season = ?query.season, "stats: profile lookup");

    match stats.profile(&query).await {
        Ok(profile) => success(profile),
        Err(e) => api_failure(e),
    }
}

pub async fn season_report(State(state): State<AppState>, Query(params): Query<ReportParams>) -> Response {
    let Some((name, tag)) = riot_id(params.name, params.tag) else {
        return missing_id();
    };
    let Some(stats) = state.stats.as_ref() else {
        return unavailable();
    };

    let mode = params.gamemode.filter(|m| !m.is_empty()).unwrap_or_else(|| DEFAULT_REPORT_MODE.to_owned());
    match stats.season_report(&name, &tag, &mode).await {
        Ok(seasons) => success(seasons),
        Err(e) => api_failure(e),
    }
}

#[cfg(test)]
#[path = "stats_test.rs"]
mod tests;
