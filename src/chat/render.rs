//! Render surface contract — `FeedUpdate` to the JSON view a browser draws.
//!
//! The browser is dumb: it paints `ChatView` as given, reports scroll
//! geometry back, and performs `scroll` when present.

use serde::Serialize;
use time::format_description::FormatItem;
use time::macros::format_description;

use super::badge::{Badge, resolve_badges};
use super::buffer::ScrollRequest;
use super::feed::FeedUpdate;
use super::message::{ChatMessage, Segment};

const EMOTE_CDN: &str = "https://static-cdn.jtvnw.net/emoticons/v2";
const TIME_LABEL: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

pub const CONNECTED_LABEL: &str = "Connected to chat";
pub const DISCONNECTED_LABEL: &str = "Disconnected";
pub const DISCONNECTED_BANNER: &str = "Disconnected from chat";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub watching: String,
    pub connected: bool,
    pub status_label: &'static str,
    /// Persistent indicator while the upstream is down.
    pub banner: Option<&'static str>,
    pub messages: Vec<MessageView>,
    pub unread_count: usize,
    pub is_paused: bool,
    pub show_resume: bool,
    pub scroll: Option<ScrollRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub author: String,
    pub color: String,
    pub badges: Vec<Badge>,
    pub segments: Vec<SegmentView>,
    pub time_label: String,
    pub sent_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentView {
    Text { text: String },
    Emote { id: String, code: String, url: String },
}

#[must_use]
pub fn emote_url(id: &str) -> String {
    format!("{EMOTE_CDN}/{id}/default/dark/1.0")
}

#[must_use]
pub fn render_view(update: &FeedUpdate) -> ChatView {
    let snapshot = &update.snapshot;
    ChatView {
        watching: update.channel.clone(),
        connected: update.connected,
        status_label: if update.connected { CONNECTED_LABEL } else { DISCONNECTED_LABEL },
        banner: (!update.connected).then_some(DISCONNECTED_BANNER),
        messages: snapshot.visible_messages.iter().map(|m| render_message(m)).collect(),
        unread_count: snapshot.unread_count,
        is_paused: snapshot.is_paused,
        show_resume: snapshot.is_paused,
        scroll: update.scroll,
    }
}

#[must_use]
pub fn render_message(msg: &ChatMessage) -> MessageView {
    let segments = msg
        .segments()
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => SegmentView::Text { text },
            Segment::Emote { id, code } => SegmentView::Emote { url: emote_url(&id), id, code },
        })
        .collect();

    MessageView {
        id: msg.id.clone(),
        author: msg.author.clone(),
        color: msg.color.clone(),
        badges: resolve_badges(&msg.badge_tags),
        segments,
        time_label: msg.timestamp.format(TIME_LABEL).unwrap_or_default(),
        sent_at_ms: msg.sent_at_ms(),
    }
}
