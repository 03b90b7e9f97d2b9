//! Badge lookup — `type/version` descriptors to icons or text labels.
//!
//! Misses are omitted: an unknown badge never renders and is not an error.

use serde::Serialize;

const SUBSCRIBER: &str = "subscriber";

/// Static icon table keyed by the full `type/version` descriptor.
const BADGE_ICONS: &[(&str, &str)] = &[
    ("broadcaster/1", "https://static-cdn.jtvnw.net/badges/v1/5527c58c-fb7d-422d-b71b-f309dcb85cc1/2"),
    ("moderator/1", "https://static-cdn.jtvnw.net/badges/v1/3267646d-33f0-4b17-b3df-f923a41db1d0/1"),
    ("vip/1", "https://static-cdn.jtvnw.net/badges/v1/b817aba4-fad8-49e2-b88a-7cc744dfa6ec/1"),
    ("partner/1", "https://static-cdn.jtvnw.net/badges/v1/d12a2e27-16f6-41d0-ab77-b780518f00a3/1"),
    ("premium/1", "https://static-cdn.jtvnw.net/badges/v1/bbbe0db0-a598-423e-86d0-f9fb98ca1933/1"),
    ("turbo/1", "https://static-cdn.jtvnw.net/badges/v1/bd444ec6-8f34-4bf9-91f4-af1e3428d80f/1"),
    ("sub-gifter/1", "https://static-cdn.jtvnw.net/badges/v1/a5ef6c17-2e5b-4d8f-9b80-2779fd722414/1"),
    ("sub-gifter/50", "https://static-cdn.jtvnw.net/badges/v1/c4a29737-e8a5-4420-917a-314a447f083e/1"),
    ("sub-gifter/100", "https://static-cdn.jtvnw.net/badges/v1/8343ada7-3451-434e-91c4-e82bdcf54460/1"),
    ("bits/1", "https://static-cdn.jtvnw.net/badges/v1/73b5c3fb-24f9-4a82-a852-2f475b59411c/1"),
    ("twitch-recap-2024/1", "https://static-cdn.jtvnw.net/badges/v1/72f2a6ac-3d9b-4406-b9e9-998b27182f61/1"),
    ("raging-wolf-helm/1", "https://static-cdn.jtvnw.net/badges/v1/3ff668be-59a3-4e3e-96af-e6b2908b3171/1"),
    (
        "purple-pixel-heart---together-for-good-24/1",
        "https://static-cdn.jtvnw.net/badges/v1/1afb4b76-8c34-4b7b-8beb-75f7e5d2a1ab/1",
    ),
];

/// A badge ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Badge {
    Icon { name: String, url: &'static str },
    Label { name: String, text: &'static str },
}

/// Look up the icon for a full `type/version` descriptor.
#[must_use]
pub fn icon_url(descriptor: &str) -> Option<&'static str> {
    BADGE_ICONS
        .iter()
        .find(|(key, _)| *key == descriptor)
        .map(|(_, url)| *url)
}

/// Resolve a raw `badges` tag into displayable badges, preserving order.
#[must_use]
pub fn resolve_badges(raw: &str) -> Vec<Badge> {
    raw.split(',')
        .filter(|descriptor| !descriptor.is_empty())
        .filter_map(|descriptor| {
            let kind = descriptor.split_once('/').map_or(descriptor, |(kind, _)| kind);
            if kind == SUBSCRIBER {
                return Some(Badge::Label { name: kind.to_owned(), text: "Sub" });
            }
            icon_url(descriptor).map(|url| Badge::Icon { name: kind.to_owned(), url })
        })
        .collect()
}
