//! Protocol parser — tag blocks, emote spans, and chat-line decoding.
//!
//! DESIGN
//! ======
//! Pure functions over borrowed strings. Nothing here panics or returns an
//! error: malformed input degrades to partial tag maps, dropped spans, or a
//! rejected line (`None`). Keep-alive and housekeeping lines are not chat
//! messages and are left to the connection manager.
//!
//! LINE SHAPE
//! ==========
//! ```text
//! @id=42;display-name=Foo;tmi-sent-ts=1700000000000 :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :hello world
//! └────────────── tag block ──────────────────────┘ └──────── prefix ────────┘ └ cmd ┘ └ ch ┘ └─ body ─┘
//! ```
//!
//! REJECTION POLICY
//! ================
//! `id` is the uniqueness key downstream, so a line without a non-empty `id`
//! tag is rejected outright rather than given a synthetic one. A line whose
//! `tmi-sent-ts` is missing or not an integer is rejected as well, because
//! the timestamp is the server's, never the receipt time.

use std::collections::HashMap;

use time::OffsetDateTime;

/// Marker that identifies a chat-message line.
const CHAT_MARKER: &str = "PRIVMSG";

/// Color used when the upstream omits one.
pub const DEFAULT_COLOR: &str = "#FFFFFF";

// =============================================================================
// TYPES
// =============================================================================

/// Inclusive character span into a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmoteSpan {
    pub start: usize,
    pub end: usize,
}

/// One emote and every place it occurs in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emote {
    pub id: String,
    pub positions: Vec<EmoteSpan>,
}

/// One decoded utterance. Shared as `Arc<ChatMessage>` after decoding and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub color: String,
    /// Raw `type/version,type/version` descriptor; see `badge::resolve_badges`.
    pub badge_tags: String,
    pub body: String,
    pub emotes: Vec<Emote>,
    /// When the upstream server recorded the message.
    pub timestamp: OffsetDateTime,
}

/// A run of plain text or an inline emote within a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Emote { id: String, code: String },
}

// =============================================================================
// TAGS
// =============================================================================

/// Parse an IRCv3 tag block (without the leading `@`) into a map.
///
/// A tag without `=` maps to an empty string. Values are unescaped.
#[must_use]
pub fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|tag| !tag.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_owned(), unescape_tag_value(value)),
            None => (tag.to_owned(), String::new()),
        })
        .collect()
}

fn unescape_tag_value(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A trailing lone backslash is dropped.
            None => {}
        }
    }
    out
}

// =============================================================================
// EMOTES
// =============================================================================

/// Parse an `emotes` tag value: `id:s-e,s-e/id:s-e`.
///
/// Spans that do not decode are dropped; an emote left with no spans is
/// dropped too.
#[must_use]
pub fn parse_emotes(raw: &str) -> Vec<Emote> {
    raw.split('/')
        .filter_map(|entry| {
            let (id, positions) = entry.split_once(':')?;
            if id.is_empty() {
                return None;
            }
            let positions: Vec<EmoteSpan> = positions.split(',').filter_map(parse_span).collect();
            if positions.is_empty() {
                return None;
            }
            Some(Emote { id: id.to_owned(), positions })
        })
        .collect()
}

fn parse_span(raw: &str) -> Option<EmoteSpan> {
    let (start, end) = raw.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    (start <= end).then_some(EmoteSpan { start, end })
}

// =============================================================================
// LINES
// =============================================================================

/// Split one socket payload into protocol lines. The upstream batches
/// several `\r\n`-terminated lines into a single frame.
pub fn split_frame(payload: &str) -> impl Iterator<Item = &str> {
    payload.lines().filter(|line| !line.is_empty())
}

/// Decode one protocol line into a chat message.
///
/// Returns `None` for anything that is not a chat message and for chat
/// messages without a usable `id` or `tmi-sent-ts`.
#[must_use]
pub fn decode_line(raw: &str) -> Option<ChatMessage> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let mut parts = line.splitn(5, ' ');
    let tag_block = parts.next()?;
    let prefix = parts.next().unwrap_or("");
    if parts.next()? != CHAT_MARKER {
        return None;
    }
    let channel = parts.next().unwrap_or("");
    let text = parts.next().unwrap_or("");

    let tags = tag_block.strip_prefix('@').map(parse_tags).unwrap_or_default();

    let id = tags.get("id").filter(|id| !id.is_empty())?.clone();
    let timestamp = tags
        .get("tmi-sent-ts")
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())?;

    let author = tags
        .get("display-name")
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| nick_from_prefix(prefix).to_owned());
    let color = tags
        .get("color")
        .filter(|color| !color.is_empty())
        .map_or_else(|| DEFAULT_COLOR.to_owned(), Clone::clone);

    Some(ChatMessage {
        id,
        channel: channel.trim_start_matches('#').to_owned(),
        author,
        color,
        badge_tags: tags.get("badges").cloned().unwrap_or_default(),
        body: text.strip_prefix(':').unwrap_or(text).to_owned(),
        emotes: parse_emotes(tags.get("emotes").map_or("", String::as_str)),
        timestamp,
    })
}

/// `:nick!user@host` → `nick`.
fn nick_from_prefix(prefix: &str) -> &str {
    let prefix = prefix.strip_prefix(':').unwrap_or(prefix);
    prefix.split_once('!').map_or(prefix, |(nick, _)| nick)
}

/// If `line` is a server keep-alive, return the reply frame for it.
#[must_use]
pub fn pong_for(line: &str) -> Option<String> {
    let rest = line.strip_prefix("PING")?;
    if rest.is_empty() {
        return Some("PONG".to_owned());
    }
    rest.starts_with(' ').then(|| format!("PONG{rest}"))
}

// =============================================================================
// MESSAGE HELPERS
// =============================================================================

impl ChatMessage {
    /// Server timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub fn sent_at_ms(&self) -> i64 {
        i64::try_from(self.timestamp.unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
    }

    /// Split the body into text runs and emotes.
    ///
    /// Spans are character offsets with an inclusive end. Overlapping or
    /// out-of-range spans are ignored and their text is kept as-is.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        let chars: Vec<char> = self.body.chars().collect();
        let mut spans: Vec<(usize, usize, &str)> = self
            .emotes
            .iter()
            .flat_map(|emote| emote.positions.iter().map(move |span| (span.start, span.end, emote.id.as_str())))
            .collect();
        spans.sort_by_key(|&(start, _, _)| start);

        let mut out = Vec::new();
        let mut cursor = 0;
        for (start, end, id) in spans {
            if start < cursor || end >= chars.len() {
                continue;
            }
            if start > cursor {
                out.push(Segment::Text(chars[cursor..start].iter().collect()));
            }
            out.push(Segment::Emote { id: id.to_owned(), code: chars[start..=end].iter().collect() });
            cursor = end + 1;
        }
        if cursor < chars.len() {
            out.push(Segment::Text(chars[cursor..].iter().collect()));
        }
        out
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
