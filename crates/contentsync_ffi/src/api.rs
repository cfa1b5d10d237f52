//! FFI use-case API for host-facing calls.
//!
//! # Responsibility
//! - Expose read, save and version-history use cases via FRB.
//! - Buffer bus events per host subscription for polling.
//! - Flatten engine errors into `ok + message` envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One process-wide engine, configured from `CONTENTSYNC_*` env vars on
//!   first use.

use contentsync_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    BroadcastEvent, ContentDraft, ContentObject, ContentSyncService, ContentTransport,
    ContentVersion, EngineConfig, EventKind, HistorySubject, HttpTransport, LogicalKey,
    RestoreConfirmation, RestoreOutcome, Subscription, SyncResult,
};
use log::{debug, error, info};
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

type HttpEngine = Arc<ContentSyncService<HttpTransport>>;

/// Undrained events kept per inbox; older events are dropped first.
const INBOX_CAPACITY: usize = 256;

static ENGINE: OnceLock<Result<HttpEngine, String>> = OnceLock::new();
static INBOXES: OnceLock<EventInboxes> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Content object as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Remote id; `None` only for never-saved objects.
    pub id: Option<i64>,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub created_at: Option<String>,
}

/// Response envelope for read and save calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResponse {
    pub ok: bool,
    /// `None` with `ok = true` means the key has no content yet.
    pub item: Option<ContentItem>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ContentResponse {
    fn success(message: impl Into<String>, item: Option<ContentObject>) -> Self {
        Self {
            ok: true,
            item: item.map(to_content_item),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            item: None,
            message: message.into(),
        }
    }
}

/// One row of a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionItem {
    pub id: i64,
    pub content_id: i64,
    pub version_number: u32,
    pub title: String,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

/// Version listing envelope, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionListResponse {
    pub ok: bool,
    pub items: Vec<VersionItem>,
    pub message: String,
}

/// Rendered version payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPreviewResponse {
    pub ok: bool,
    pub formatted: String,
    /// Structured payload failed to parse; restoring needs confirmation.
    pub corrupted: bool,
    pub message: String,
}

/// Restore envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreResponse {
    pub ok: bool,
    /// Version is corrupted; call again with `confirm_corrupted = true`.
    pub needs_confirmation: bool,
    pub item: Option<ContentItem>,
    pub message: String,
}

impl RestoreResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            needs_confirmation: false,
            item: None,
            message: message.into(),
        }
    }
}

/// Reads content for `(slug, section)`, serving from cache when possible.
///
/// # FFI contract
/// - Sync call, may block on the network.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn content_get(slug: String, section: Option<String>) -> ContentResponse {
    match engine() {
        Ok(service) => get_with(service, &slug, section.as_deref()),
        Err(err) => ContentResponse::failure(format!("content_get failed: {err}")),
    }
}

/// Saves title and content under `(slug, section)` as a new version.
///
/// # FFI contract
/// - Sync call, may block on the network.
/// - Empty `version_notes` falls back to the default note.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn content_save(
    slug: String,
    section: Option<String>,
    title: String,
    content: String,
    version_notes: Option<String>,
) -> ContentResponse {
    let draft = ContentDraft::new(title, content);
    match engine() {
        Ok(service) => save_with(
            service,
            &slug,
            section.as_deref(),
            &draft,
            version_notes.as_deref(),
        ),
        Err(err) => ContentResponse::failure(format!("content_save failed: {err}")),
    }
}

/// Broadcasts cache invalidation for one key, or every key when `slug` is `None`.
#[flutter_rust_bridge::frb(sync)]
pub fn content_invalidate(slug: Option<String>, section: Option<String>) -> ContentResponse {
    match engine() {
        Ok(service) => invalidate_with(service, slug.as_deref(), section.as_deref()),
        Err(err) => ContentResponse::failure(format!("content_invalidate failed: {err}")),
    }
}

/// Lists versions for `(slug, section)`, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn versions_list(slug: String, section: Option<String>) -> VersionListResponse {
    match engine() {
        Ok(service) => versions_with(service, &slug, section.as_deref()),
        Err(err) => list_response(Err(err)),
    }
}

/// Lists versions for a content id, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn versions_list_by_id(content_id: i64) -> VersionListResponse {
    match engine() {
        Ok(service) => {
            list_response(service.list_versions(&HistorySubject::ContentId(content_id)))
        }
        Err(err) => list_response(Err(err)),
    }
}

/// Renders a version returned by an earlier [`versions_list`] call.
#[flutter_rust_bridge::frb(sync)]
pub fn version_preview(version_id: i64) -> VersionPreviewResponse {
    match engine() {
        Ok(service) => preview_with(service, version_id),
        Err(err) => VersionPreviewResponse {
            ok: false,
            formatted: String::new(),
            corrupted: false,
            message: format!("version_preview failed: {err}"),
        },
    }
}

/// Restores a version returned by an earlier [`versions_list`] call.
///
/// # FFI contract
/// - Ids not listed in this process fail; see [`version_restore_by_id`].
/// - Corrupted versions return `needs_confirmation = true` unless
///   `confirm_corrupted` is set.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn version_restore(version_id: i64, confirm_corrupted: bool) -> RestoreResponse {
    match engine() {
        Ok(service) => restore_with(service, version_id, confirm_corrupted),
        Err(err) => RestoreResponse::failure(format!("version_restore failed: {err}")),
    }
}

/// Restores a version of `content_id` without requiring an earlier
/// [`versions_list`] call in this process.
///
/// # FFI contract
/// - Same confirmation rules as [`version_restore`].
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn version_restore_by_id(
    content_id: i64,
    version_id: i64,
    confirm_corrupted: bool,
) -> RestoreResponse {
    match engine() {
        Ok(service) => restore_response(
            service.restore_version_of(
                &HistorySubject::ContentId(content_id),
                version_id,
                confirmation(confirm_corrupted),
            ),
        ),
        Err(err) => RestoreResponse::failure(format!("version_restore failed: {err}")),
    }
}

/// Opens an event inbox for the given wire kinds.
///
/// Input semantics:
/// - `kinds`: wire names such as `content-refreshed`; empty means every kind.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Events are buffered until [`events_drain`]; at most 256 are kept.
/// - Unknown kind names fail without opening an inbox.
#[flutter_rust_bridge::frb(sync)]
pub fn events_subscribe(kinds: Vec<String>) -> EventSubscribeResponse {
    match engine() {
        Ok(service) => inboxes().open(service, &kinds),
        Err(err) => EventSubscribeResponse::failure(format!("events_subscribe failed: {err}")),
    }
}

/// Takes every buffered event from an inbox, oldest first.
#[flutter_rust_bridge::frb(sync)]
pub fn events_drain(subscription_id: u64) -> EventDrainResponse {
    inboxes().drain(subscription_id)
}

/// Closes an inbox. Returns `false` when the id is not open.
#[flutter_rust_bridge::frb(sync)]
pub fn events_unsubscribe(subscription_id: u64) -> bool {
    inboxes().close(subscription_id)
}

fn inboxes() -> &'static EventInboxes {
    INBOXES.get_or_init(|| EventInboxes::new(INBOX_CAPACITY))
}

fn engine() -> Result<&'static HttpEngine, String> {
    ENGINE
        .get_or_init(|| {
            let config = EngineConfig::from_env().map_err(|err| err.to_string())?;
            let transport = HttpTransport::new(&config).map_err(|err| err.to_string())?;
            Ok(ContentSyncService::create(transport, &config))
        })
        .as_ref()
        .map_err(|err| {
            error!("event=engine_init module=ffi status=error error={err}");
            err.clone()
        })
}

fn get_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    slug: &str,
    section: Option<&str>,
) -> ContentResponse {
    let read = service.get_content(slug, section);
    match read.error {
        Some(err) => ContentResponse::failure(format!("content_get failed: {err}")),
        None if read.value.is_none() => ContentResponse::success("No content yet.", None),
        None => ContentResponse::success("Content loaded.", read.value),
    }
}

fn save_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    slug: &str,
    section: Option<&str>,
    draft: &ContentDraft,
    version_notes: Option<&str>,
) -> ContentResponse {
    match service.save_content(slug, section, draft, version_notes) {
        Ok(saved) => ContentResponse::success("Content saved.", Some(saved)),
        Err(err) => ContentResponse::failure(format!("content_save failed: {err}")),
    }
}

fn invalidate_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    slug: Option<&str>,
    section: Option<&str>,
) -> ContentResponse {
    match slug {
        None => {
            service.invalidate(None);
            ContentResponse::success("All content invalidated.", None)
        }
        Some(slug) => match LogicalKey::new(slug, section) {
            Some(key) => {
                service.invalidate(Some(&key));
                ContentResponse::success(format!("Invalidated {key}."), None)
            }
            None => ContentResponse::failure("content_invalidate failed: slug is empty"),
        },
    }
}

fn versions_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    slug: &str,
    section: Option<&str>,
) -> VersionListResponse {
    list_response(service.list_versions_by_slug(slug, section))
}

fn list_response<E: Display>(result: Result<Vec<ContentVersion>, E>) -> VersionListResponse {
    match result {
        Ok(versions) => {
            let items = versions.iter().map(to_version_item).collect::<Vec<_>>();
            let message = if items.is_empty() {
                "No versions.".to_string()
            } else {
                format!("Found {} version(s).", items.len())
            };
            VersionListResponse {
                ok: true,
                items,
                message,
            }
        }
        Err(err) => VersionListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("versions_list failed: {err}"),
        },
    }
}

fn preview_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    version_id: i64,
) -> VersionPreviewResponse {
    match service.preview_listed(version_id) {
        Ok(preview) => VersionPreviewResponse {
            ok: true,
            message: preview
                .detail
                .clone()
                .unwrap_or_else(|| "Preview ready.".to_string()),
            formatted: preview.formatted,
            corrupted: preview.corrupted,
        },
        Err(err) => VersionPreviewResponse {
            ok: false,
            formatted: String::new(),
            corrupted: false,
            message: format!("version_preview failed: {err}"),
        },
    }
}

fn restore_with<T: ContentTransport>(
    service: &ContentSyncService<T>,
    version_id: i64,
    confirm_corrupted: bool,
) -> RestoreResponse {
    restore_response(service.restore_version(version_id, confirmation(confirm_corrupted)))
}

fn confirmation(confirm_corrupted: bool) -> RestoreConfirmation {
    if confirm_corrupted {
        RestoreConfirmation::Confirmed
    } else {
        RestoreConfirmation::Unconfirmed
    }
}

fn restore_response(result: SyncResult<RestoreOutcome>) -> RestoreResponse {
    match result {
        Ok(RestoreOutcome::Restored(restored)) => RestoreResponse {
            ok: true,
            needs_confirmation: false,
            item: Some(to_content_item(restored)),
            message: "Version restored.".to_string(),
        },
        Ok(RestoreOutcome::ConfirmationRequired(preview)) => RestoreResponse {
            ok: false,
            needs_confirmation: true,
            item: None,
            message: preview
                .detail
                .map(|detail| format!("Version content is corrupted: {detail}"))
                .unwrap_or_else(|| "Version content is corrupted.".to_string()),
        },
        Err(err) => RestoreResponse::failure(format!("version_restore failed: {err}")),
    }
}

/// One bus event as delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventItem {
    /// Wire name, e.g. `content-refreshed`.
    pub kind: String,
    /// Canonical key; `None` means every key.
    pub key: Option<String>,
    pub item: Option<ContentItem>,
    pub force_refresh: bool,
}

/// Envelope for [`events_subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubscribeResponse {
    pub ok: bool,
    /// Inbox id for drain/unsubscribe; `0` when `ok = false`.
    pub subscription_id: u64,
    pub message: String,
}

impl EventSubscribeResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            subscription_id: 0,
            message: message.into(),
        }
    }
}

/// Envelope for [`events_drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDrainResponse {
    pub ok: bool,
    pub items: Vec<EventItem>,
    /// Events discarded since the last drain because the inbox was full.
    pub dropped: u64,
    pub message: String,
}

#[derive(Default)]
struct InboxQueue {
    events: VecDeque<EventItem>,
    dropped: u64,
}

struct EventInbox {
    queue: Arc<Mutex<InboxQueue>>,
    _subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct InboxTable {
    next_id: u64,
    open: HashMap<u64, EventInbox>,
}

/// Host-side event inboxes keyed by subscription id.
struct EventInboxes {
    capacity: usize,
    table: Mutex<InboxTable>,
}

impl EventInboxes {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            table: Mutex::new(InboxTable::default()),
        }
    }

    fn open<T: ContentTransport>(
        &self,
        service: &ContentSyncService<T>,
        kinds: &[String],
    ) -> EventSubscribeResponse {
        let kinds = match parse_kinds(kinds) {
            Ok(kinds) => kinds,
            Err(message) => return EventSubscribeResponse::failure(message),
        };

        let queue: Arc<Mutex<InboxQueue>> = Arc::default();
        let capacity = self.capacity;
        let subscriptions = kinds
            .iter()
            .map(|kind| {
                let sink = Arc::clone(&queue);
                service.subscribe(*kind, move |event| {
                    push_event(&sink, capacity, to_event_item(event))
                })
            })
            .collect::<Vec<_>>();

        let mut table = self.lock_table();
        table.next_id += 1;
        let id = table.next_id;
        table.open.insert(
            id,
            EventInbox {
                queue,
                _subscriptions: subscriptions,
            },
        );
        info!(
            "event=events_subscribe module=ffi status=ok subscription={id} kinds={}",
            kinds.len()
        );
        EventSubscribeResponse {
            ok: true,
            subscription_id: id,
            message: "Subscribed.".to_string(),
        }
    }

    fn drain(&self, id: u64) -> EventDrainResponse {
        let queue = match self.lock_table().open.get(&id) {
            Some(inbox) => Arc::clone(&inbox.queue),
            None => {
                return EventDrainResponse {
                    ok: false,
                    items: Vec::new(),
                    dropped: 0,
                    message: format!("events_drain failed: unknown subscription {id}"),
                }
            }
        };
        let mut queue = lock_queue(&queue);
        let items: Vec<EventItem> = queue.events.drain(..).collect();
        let dropped = std::mem::take(&mut queue.dropped);
        debug!(
            "event=events_drain module=ffi status=ok subscription={id} count={} dropped={dropped}",
            items.len()
        );
        EventDrainResponse {
            ok: true,
            message: format!("Drained {} event(s).", items.len()),
            items,
            dropped,
        }
    }

    fn close(&self, id: u64) -> bool {
        let removed = self.lock_table().open.remove(&id);
        match removed {
            Some(inbox) => {
                drop(inbox);
                info!("event=events_unsubscribe module=ffi status=ok subscription={id}");
                true
            }
            None => false,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, InboxTable> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_kinds(names: &[String]) -> Result<Vec<EventKind>, String> {
    if names.is_empty() {
        return Ok(EventKind::all().to_vec());
    }
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let kind = EventKind::from_wire(name.trim())
            .ok_or_else(|| format!("events_subscribe failed: unknown event kind `{name}`"))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn push_event(queue: &Mutex<InboxQueue>, capacity: usize, item: EventItem) {
    let mut queue = lock_queue(queue);
    while queue.events.len() >= capacity.max(1) {
        queue.events.pop_front();
        queue.dropped += 1;
    }
    queue.events.push_back(item);
}

fn lock_queue(queue: &Mutex<InboxQueue>) -> MutexGuard<'_, InboxQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_event_item(event: &BroadcastEvent) -> EventItem {
    EventItem {
        kind: event.kind.as_str().to_string(),
        key: event.key.clone(),
        item: event.payload.clone().map(to_content_item),
        force_refresh: event.force_refresh,
    }
}

fn to_content_item(object: ContentObject) -> ContentItem {
    ContentItem {
        id: object.id,
        slug: object.slug,
        title: object.title,
        content: object.content,
        created_at: object.created_at,
    }
}

fn to_version_item(version: &ContentVersion) -> VersionItem {
    VersionItem {
        id: version.id,
        content_id: version.content_id,
        version_number: version.version_number,
        title: version.title.clone(),
        notes: version.notes.clone(),
        created_at: version.created_at.clone(),
    }
}
