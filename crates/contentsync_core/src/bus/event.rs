//! Broadcast event envelope.

use crate::model::content::ContentObject;
use std::fmt::{Display, Formatter};

/// Event kinds carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    CacheInvalidated,
    ContentRefreshed,
    VersionHistoryReset,
    SpecialUpdate,
}

impl EventKind {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheInvalidated => "cache-invalidated",
            Self::ContentRefreshed => "content-refreshed",
            Self::VersionHistoryReset => "version-history-reset",
            Self::SpecialUpdate => "special-update",
        }
    }

    /// Parses a wire name produced by [`EventKind::as_str`].
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|kind| kind.as_str() == name)
    }

    /// Refresh-class events are subject to subscriber throttling.
    pub fn is_refresh_class(self) -> bool {
        matches!(self, Self::ContentRefreshed | Self::SpecialUpdate)
    }

    pub fn is_invalidation_class(self) -> bool {
        matches!(self, Self::CacheInvalidated | Self::VersionHistoryReset)
    }

    pub fn all() -> [EventKind; 4] {
        [
            Self::CacheInvalidated,
            Self::ContentRefreshed,
            Self::VersionHistoryReset,
            Self::SpecialUpdate,
        ]
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed notification `{ kind, key, payload?, forceRefresh? }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub kind: EventKind,
    /// Canonical logical key; `None` means every key.
    pub key: Option<String>,
    pub payload: Option<ContentObject>,
    /// Subscribers must re-read instead of adopting `payload`.
    pub force_refresh: bool,
}

impl BroadcastEvent {
    pub fn new(kind: EventKind, key: Option<String>) -> Self {
        Self {
            kind,
            key,
            payload: None,
            force_refresh: false,
        }
    }

    pub fn cache_invalidated(key: Option<&str>) -> Self {
        Self::new(EventKind::CacheInvalidated, key.map(str::to_string))
    }

    pub fn content_refreshed(key: &str, payload: ContentObject) -> Self {
        Self::new(EventKind::ContentRefreshed, Some(key.to_string())).with_payload(payload)
    }

    pub fn version_history_reset(key: Option<&str>) -> Self {
        Self::new(EventKind::VersionHistoryReset, key.map(str::to_string))
    }

    pub fn special_update(key: Option<&str>) -> Self {
        Self::new(EventKind::SpecialUpdate, key.map(str::to_string))
    }

    pub fn with_payload(mut self, payload: ContentObject) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn forcing_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Whether this event concerns `key`.
    pub fn applies_to(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |target| target == key)
    }

    /// Key label for logs.
    pub fn key_label(&self) -> &str {
        self.key.as_deref().unwrap_or("*")
    }
}
