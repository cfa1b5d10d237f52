//! Version history: listing, preview and restore.
//!
//! # Responsibility
//! - List versions newest first and remember them for later restore.
//! - Preview version payloads, flagging structurally broken ones.
//! - Restore a version through a versioned write followed by a re-read of
//!   the parent by canonical key.
//!
//! # Invariants
//! - Version numbers come from the remote store only.
//! - A corrupted payload is flagged, never returned as an error, and never
//!   blocks restore once the caller confirms.

use crate::bus::event::BroadcastEvent;
use crate::gateway::remote::{GatewayError, VersionTarget};
use crate::gateway::transport::ContentTransport;
use crate::identity::resolver::LogicalKey;
use crate::model::content::{ContentDraft, ContentId, ContentObject};
use crate::model::version::{sort_newest_first, ContentVersion};
use crate::service::content_service::{ContentSyncService, SyncError, SyncResult};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Rendered version payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPreview {
    /// Pretty-printed structured payload, or the raw text.
    pub formatted: String,
    /// The payload looked structured but failed to parse.
    pub corrupted: bool,
    /// Parser message when `corrupted` is set.
    pub detail: Option<String>,
}

/// Renders a version's content for display.
///
/// Content starting with `[` is treated as a serialized structured payload
/// and pretty-printed; if it does not parse, the raw text is returned with
/// `corrupted = true`. Never fails.
pub fn preview_version(version: &ContentVersion) -> VersionPreview {
    preview_content(&version.content)
}

pub fn preview_content(content: &str) -> VersionPreview {
    let trimmed = content.trim();
    if !trimmed.starts_with('[') {
        return VersionPreview {
            formatted: content.to_string(),
            corrupted: false,
            detail: None,
        };
    }

    let parsed = serde_json::from_str::<serde_json::Value>(trimmed)
        .map_err(|err| err.to_string())
        .and_then(|value| {
            if value.is_array() {
                serde_json::to_string_pretty(&value).map_err(|err| err.to_string())
            } else {
                Err("payload is not an array".to_string())
            }
        });
    match parsed {
        Ok(formatted) => VersionPreview {
            formatted,
            corrupted: false,
            detail: None,
        },
        Err(detail) => VersionPreview {
            formatted: content.to_string(),
            corrupted: true,
            detail: Some(detail),
        },
    }
}

/// Caller's answer to the corrupted-version warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreConfirmation {
    Unconfirmed,
    Confirmed,
}

/// Result of a restore request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The parent now holds the version's state, as re-read from the store.
    Restored(ContentObject),
    /// The version is corrupted; ask the user and retry with `Confirmed`.
    ConfirmationRequired(VersionPreview),
}

/// What to list history for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistorySubject {
    Key(LogicalKey),
    ContentId(ContentId),
}

#[derive(Debug, Clone)]
struct ListedVersion {
    key: Option<LogicalKey>,
    version: ContentVersion,
}

/// Versions returned by earlier listings, addressable by version id.
#[derive(Debug, Default)]
pub struct VersionLedger {
    entries: Mutex<HashMap<i64, ListedVersion>>,
}

impl VersionLedger {
    fn record(&self, key: Option<&LogicalKey>, versions: &[ContentVersion]) {
        let mut entries = self.lock();
        for version in versions {
            entries.insert(
                version.id,
                ListedVersion {
                    key: key.cloned(),
                    version: version.clone(),
                },
            );
        }
    }

    fn get(&self, version_id: i64) -> Option<ListedVersion> {
        self.lock().get(&version_id).cloned()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, ListedVersion>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: ContentTransport> ContentSyncService<T> {
    /// Lists versions newest first. Unknown parents yield an empty list.
    pub fn list_versions(&self, subject: &HistorySubject) -> SyncResult<Vec<ContentVersion>> {
        self.ensure_live()?;
        let (key, listing) = match subject {
            HistorySubject::ContentId(id) => {
                let key = self
                    .cache()
                    .find_by_id(*id)
                    .and_then(|(_, object)| LogicalKey::from_slug(&object.slug));
                let listing = self
                    .gateway()
                    .list_versions(&VersionTarget::ContentId(*id))?;
                (key, listing)
            }
            HistorySubject::Key(key) => (Some(key.clone()), self.list_versions_for_key(key)?),
        };

        let mut versions = listing.unwrap_or_default();
        sort_newest_first(&mut versions);
        self.ledger.record(key.as_ref(), &versions);
        info!(
            "event=version_list module=history status=ok key={} count={} newest={}",
            key.as_ref().map(LogicalKey::canonical).unwrap_or("-"),
            versions.len(),
            versions.first().map(|v| v.version_number).unwrap_or(0)
        );
        Ok(versions)
    }

    /// Convenience wrapper over [`ContentSyncService::list_versions`].
    pub fn list_versions_by_slug(
        &self,
        slug: &str,
        section: Option<&str>,
    ) -> SyncResult<Vec<ContentVersion>> {
        let key = self.resolve_key(slug, section)?;
        self.list_versions(&HistorySubject::Key(key))
    }

    fn list_versions_for_key(&self, key: &LogicalKey) -> SyncResult<Option<Vec<ContentVersion>>> {
        if let Some(id) = self.known_object(key).and_then(|object| object.id) {
            return Ok(self
                .gateway()
                .list_versions(&VersionTarget::ContentId(id))?);
        }
        for candidate in key.candidates() {
            let target = VersionTarget::Slug(candidate.clone());
            if let Some(versions) = self.gateway().list_versions(&target)? {
                return Ok(Some(versions));
            }
        }
        Ok(None)
    }

    /// Previews a version from an earlier listing.
    pub fn preview_listed(&self, version_id: i64) -> SyncResult<VersionPreview> {
        self.ledger
            .get(version_id)
            .map(|listed| preview_version(&listed.version))
            .ok_or(SyncError::UnknownVersion(version_id))
    }

    /// Restores a version of `subject`, listing its history first when
    /// `version_id` has not been listed by this engine yet.
    pub fn restore_version_of(
        &self,
        subject: &HistorySubject,
        version_id: i64,
        confirmation: RestoreConfirmation,
    ) -> SyncResult<RestoreOutcome> {
        self.ensure_live()?;
        if self.ledger.get(version_id).is_none() {
            let listed = self.list_versions(subject)?;
            if !listed.iter().any(|version| version.id == version_id) {
                warn!(
                    "event=version_restore module=history status=error reason=not_in_history version_id={}",
                    version_id
                );
                return Err(SyncError::UnknownVersion(version_id));
            }
        }
        self.restore_version(version_id, confirmation)
    }

    /// Restores a version returned by an earlier listing on this engine.
    ///
    /// Ids never listed here fail with [`SyncError::UnknownVersion`]; use
    /// [`ContentSyncService::restore_version_of`] when only the parent is
    /// known.
    ///
    /// Writes the version's title and content as a new version, resets
    /// history state for the key, re-reads the parent by canonical key
    /// (falling back to the full listing), then holds the snapshot and
    /// broadcasts `content-refreshed` with the re-read object.
    pub fn restore_version(
        &self,
        version_id: i64,
        confirmation: RestoreConfirmation,
    ) -> SyncResult<RestoreOutcome> {
        self.ensure_live()?;
        let listed = self
            .ledger
            .get(version_id)
            .ok_or(SyncError::UnknownVersion(version_id))?;
        let version = &listed.version;

        let preview = preview_version(version);
        if preview.corrupted {
            if confirmation == RestoreConfirmation::Unconfirmed {
                warn!(
                    "event=version_restore module=history status=skipped reason=needs_confirmation version_id={} version={}",
                    version.id, version.version_number
                );
                return Ok(RestoreOutcome::ConfirmationRequired(preview));
            }
            warn!(
                "event=version_restore module=history status=start corrupted=true version_id={}",
                version.id
            );
        }

        let draft = ContentDraft::new(version.title.clone(), version.content.clone());
        let notes = format!("Restored from version {}", version.version_number);
        let updated = self
            .gateway()
            .update_with_version(version.content_id, &draft, &notes)?;

        let key = match listed.key.clone() {
            Some(key) => key,
            None => LogicalKey::from_slug(&updated.slug).ok_or(SyncError::NoIdentity)?,
        };

        self.bus()
            .publish(BroadcastEvent::version_history_reset(Some(key.canonical())));
        self.supersede_reads(&key);

        let restored = match self.lookup_remote(&key) {
            Ok(Some(restored)) => restored,
            Ok(None) => {
                self.cache().invalidate(Some(key.canonical()));
                return Err(GatewayError::NotFound(key.canonical().to_string()).into());
            }
            Err(err) => {
                self.cache().invalidate(Some(key.canonical()));
                return Err(err);
            }
        };

        info!(
            "event=version_restore module=history status=ok key={} version_id={} version={}",
            key, version.id, version.version_number
        );
        self.accept_local_write(&key, restored.clone());
        Ok(RestoreOutcome::Restored(restored))
    }
}

#[cfg(test)]
mod tests {
    use super::{preview_content, preview_version};
    use crate::model::version::ContentVersion;

    #[test]
    fn plain_markup_is_returned_verbatim() {
        let preview = preview_content("<p>Hello</p>");
        assert_eq!(preview.formatted, "<p>Hello</p>");
        assert!(!preview.corrupted);
    }

    #[test]
    fn structured_payload_is_pretty_printed() {
        let preview = preview_content(r#"[{"type":"p","text":"hi"}]"#);
        assert!(!preview.corrupted);
        assert!(preview.formatted.contains('\n'));
        assert!(preview.formatted.contains("\"text\": \"hi\""));
    }

    #[test]
    fn broken_structured_payload_is_flagged_with_raw_text() {
        let version = ContentVersion {
            id: 1,
            content_id: 7,
            version_number: 1,
            title: "t".to_string(),
            content: "[invalid json".to_string(),
            created_at: None,
            notes: None,
        };
        let preview = preview_version(&version);
        assert!(preview.corrupted);
        assert_eq!(preview.formatted, "[invalid json");
        assert!(preview.detail.is_some());
    }
}
