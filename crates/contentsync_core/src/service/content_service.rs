//! Content synchronization service.
//!
//! # Responsibility
//! - Run the read path: resolve key, check cache, try remote candidates,
//!   fall back to a full listing scan, commit through the snapshot guard.
//! - Run the save path: write with version creation, hold the snapshot,
//!   update the cache, broadcast the refreshed object.
//! - Wire the bus to the cache (`cache-invalidated`) and the guard
//!   (`version-history-reset`).
//!
//! # Invariants
//! - A fetched value never overwrites a held snapshot for the same key.
//! - A fetch whose ticket predates a save, restore or invalidation of its
//!   key is never written to the cache.
//! - A failed save leaves cache and guard untouched.
//! - Cache and guard mutations never span a gateway call.

use crate::bus::broadcast::{EventBus, Subscription};
use crate::bus::event::{BroadcastEvent, EventKind};
use crate::cache::content_cache::{CacheValue, ContentCache, ALL_CONTENT_KEY};
use crate::config::EngineConfig;
use crate::gateway::remote::{GatewayError, GatewayResult, RemoteContentGateway};
use crate::gateway::transport::ContentTransport;
use crate::guard::snapshot_guard::{Admission, GuardState, ReleaseReason, SnapshotGuard};
use crate::identity::resolver::LogicalKey;
use crate::model::content::{ContentDraft, ContentObject, DraftValidationError};
use crate::service::version_history::VersionLedger;
use crate::surface::capability::SurfaceCapability;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Notes attached to a save when the caller supplies none.
pub const DEFAULT_VERSION_NOTES: &str = "Content updated";

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced to editing surfaces and hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Gateway(GatewayError),
    InvalidDraft(DraftValidationError),
    /// The slug was empty; nothing may be cached or saved.
    NoIdentity,
    /// The version id was not produced by a prior listing.
    UnknownVersion(i64),
    CapabilityDenied(SurfaceCapability),
    /// The surface is not in a mode that allows the operation.
    InvalidState(&'static str),
    Disposed,
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_retryable())
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway(err) => write!(f, "{err}"),
            Self::InvalidDraft(err) => write!(f, "{err}"),
            Self::NoIdentity => write!(f, "content has no identity: slug is empty"),
            Self::UnknownVersion(id) => write!(f, "version not found in listed history: {id}"),
            Self::CapabilityDenied(capability) => {
                write!(f, "viewer lacks capability: {}", capability.as_str())
            }
            Self::InvalidState(message) => write!(f, "invalid surface state: {message}"),
            Self::Disposed => write!(f, "content engine has been disposed"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Gateway(err) => Some(err),
            Self::InvalidDraft(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for SyncError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<DraftValidationError> for SyncError {
    fn from(value: DraftValidationError) -> Self {
        Self::InvalidDraft(value)
    }
}

/// Snapshot of a reactive read: `{ value, isLoading, error }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentRead {
    pub value: Option<ContentObject>,
    pub is_loading: bool,
    pub error: Option<SyncError>,
}

impl ContentRead {
    pub fn ready(value: Option<ContentObject>) -> Self {
        Self {
            value,
            is_loading: false,
            error: None,
        }
    }

    pub fn failed(value: Option<ContentObject>, error: SyncError) -> Self {
        Self {
            value,
            is_loading: false,
            error: Some(error),
        }
    }
}

/// Write-order marker for one key. Compared at commit time to detect reads
/// that were overtaken by a save, restore or invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    global: u64,
    key: u64,
}

#[derive(Debug, Default)]
struct EpochTable {
    global: u64,
    per_key: HashMap<String, u64>,
}

impl EpochTable {
    fn current(&self, key: &str) -> Epoch {
        Epoch {
            global: self.global,
            key: self.per_key.get(key).copied().unwrap_or(0),
        }
    }

    fn bump(&mut self, key: Option<&str>) {
        match key {
            Some(key) => *self.per_key.entry(key.to_string()).or_insert(0) += 1,
            None => self.global += 1,
        }
    }
}

type SharedEpochs = Arc<Mutex<EpochTable>>;
type PendingCounts = Arc<Mutex<HashMap<String, usize>>>;

/// Outstanding background read for one key.
///
/// Issued by [`ContentSyncService::begin_fetch`] and consumed by
/// [`ContentSyncService::commit_fetch`]. Dropping it abandons the read.
#[derive(Debug)]
pub struct FetchTicket {
    key: LogicalKey,
    epoch: Epoch,
    pending: PendingCounts,
}

impl FetchTicket {
    pub fn key(&self) -> &LogicalKey {
        &self.key
    }
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        let mut pending = lock_or_recover(&self.pending);
        if let Some(count) = pending.get_mut(self.key.canonical()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                pending.remove(self.key.canonical());
            }
        }
    }
}

/// Engine instance: gateway, cache, guard and bus for one host.
pub struct ContentSyncService<T: ContentTransport> {
    gateway: RemoteContentGateway<T>,
    cache: Arc<ContentCache>,
    guard: Arc<SnapshotGuard>,
    bus: Arc<EventBus>,
    epochs: SharedEpochs,
    pending: PendingCounts,
    pub(crate) ledger: VersionLedger,
    refresh_throttle: Duration,
    wiring: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl<T: ContentTransport> ContentSyncService<T> {
    /// Creates an engine with its own bus, cache and guard.
    pub fn create(transport: T, config: &EngineConfig) -> Arc<Self> {
        Self::with_bus(transport, config, EventBus::create())
    }

    /// Creates an engine publishing on an existing bus.
    pub fn with_bus(transport: T, config: &EngineConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let cache = Arc::new(ContentCache::new());
        let guard = Arc::new(SnapshotGuard::new());
        let epochs: SharedEpochs = Arc::default();

        let wiring = vec![
            subscribe_cache_invalidation(&bus, Arc::clone(&cache), Arc::clone(&epochs)),
            subscribe_history_reset(&bus, Arc::clone(&guard)),
        ];
        info!(
            "event=engine_create module=service status=ok throttle_ms={} timeout_ms={}",
            config.refresh_throttle.as_millis(),
            config.request_timeout.as_millis()
        );

        Arc::new(Self {
            gateway: RemoteContentGateway::new(transport),
            cache,
            guard,
            bus,
            epochs,
            pending: Arc::default(),
            ledger: VersionLedger::default(),
            refresh_throttle: config.refresh_throttle,
            wiring: Mutex::new(wiring),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn guard(&self) -> &SnapshotGuard {
        &self.guard
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn gateway(&self) -> &RemoteContentGateway<T> {
        &self.gateway
    }

    /// Window surfaces should use for their refresh throttle.
    pub fn refresh_throttle(&self) -> Duration {
        self.refresh_throttle
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Resolves a logical key or fails with [`SyncError::NoIdentity`].
    pub fn resolve_key(&self, slug: &str, section: Option<&str>) -> SyncResult<LogicalKey> {
        LogicalKey::new(slug, section).ok_or(SyncError::NoIdentity)
    }

    /// Cache-only view of a key.
    pub fn peek(&self, key: &LogicalKey) -> ContentRead {
        let value = self
            .cache
            .get(key.canonical())
            .and_then(CacheValue::into_object);
        ContentRead {
            value,
            is_loading: lock_or_recover(&self.pending).contains_key(key.canonical()),
            error: None,
        }
    }

    /// Reads content, serving from cache when possible.
    ///
    /// An empty slug yields a blank read carrying [`SyncError::NoIdentity`].
    pub fn get_content(&self, slug: &str, section: Option<&str>) -> ContentRead {
        match self.resolve_key(slug, section) {
            Ok(key) => self.get_content_for_key(&key),
            Err(err) => ContentRead::failed(None, err),
        }
    }

    pub fn get_content_for_key(&self, key: &LogicalKey) -> ContentRead {
        if let Err(err) = self.ensure_live() {
            return ContentRead::failed(None, err);
        }
        if let Some(value) = self.cache.get(key.canonical()) {
            debug!(
                "event=content_read module=service status=ok source=cache key={}",
                key
            );
            return ContentRead::ready(value.into_object());
        }
        self.refresh_key(key)
    }

    /// Reads content from the remote store, bypassing the cache.
    pub fn refresh_key(&self, key: &LogicalKey) -> ContentRead {
        let ticket = self.begin_fetch(key);
        let result = self.fetch_remote(&ticket);
        self.commit_fetch(ticket, result)
    }

    /// Starts a background read; see [`FetchTicket`].
    pub fn begin_fetch(&self, key: &LogicalKey) -> FetchTicket {
        let epoch = lock_or_recover(&self.epochs).current(key.canonical());
        *lock_or_recover(&self.pending)
            .entry(key.canonical().to_string())
            .or_insert(0) += 1;
        FetchTicket {
            key: key.clone(),
            epoch,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Network phase of a background read. Does not touch the key's entry;
    /// a listing fetched on the fallback path refreshes the collection entry
    /// only when no write landed on it since the fetch started.
    pub fn fetch_remote(&self, ticket: &FetchTicket) -> SyncResult<Option<ContentObject>> {
        self.lookup_remote(&ticket.key)
    }

    /// Commit phase of a background read.
    ///
    /// A held snapshot is written instead of the fetched value. A ticket
    /// overtaken by a later write or invalidation commits nothing. Errors
    /// leave the cache untouched.
    pub fn commit_fetch(
        &self,
        ticket: FetchTicket,
        result: SyncResult<Option<ContentObject>>,
    ) -> ContentRead {
        let key = ticket.key.canonical();
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    "event=content_read module=service status=error key={} error={}",
                    key, err
                );
                let cached = self.cache.get(key).and_then(CacheValue::into_object);
                return ContentRead::failed(cached, err);
            }
        };
        if self.is_disposed() {
            return ContentRead::failed(None, SyncError::Disposed);
        }

        match self.guard.admit(key, fetched) {
            Admission::Shadowed(snapshot) => {
                info!(
                    "event=content_commit module=service status=skipped reason=snapshot_held key={}",
                    key
                );
                self.cache.set(key, CacheValue::Object(snapshot.clone()));
                ContentRead::ready(Some(snapshot))
            }
            Admission::Accept(fetched) => {
                let epochs = lock_or_recover(&self.epochs);
                if epochs.current(key) != ticket.epoch {
                    info!(
                        "event=content_commit module=service status=skipped reason=superseded key={}",
                        key
                    );
                    return ContentRead::ready(
                        self.cache.get(key).and_then(CacheValue::into_object),
                    );
                }
                debug!(
                    "event=content_commit module=service status=ok key={} found={}",
                    key,
                    fetched.is_some()
                );
                self.cache.set(key, CacheValue::from(fetched.clone()));
                ContentRead::ready(fetched)
            }
        }
    }

    /// Saves a draft under `(slug, section)`.
    pub fn save_content(
        &self,
        slug: &str,
        section: Option<&str>,
        draft: &ContentDraft,
        version_notes: Option<&str>,
    ) -> SyncResult<ContentObject> {
        let key = self.resolve_key(slug, section)?;
        self.save(&key, draft, version_notes)
    }

    /// Saves a draft: versioned update when the object exists, create otherwise.
    ///
    /// On success the snapshot guard holds the returned object, the cache is
    /// updated and a `content-refreshed` event carries the object.
    pub fn save(
        &self,
        key: &LogicalKey,
        draft: &ContentDraft,
        version_notes: Option<&str>,
    ) -> SyncResult<ContentObject> {
        self.ensure_live()?;
        draft.validate()?;
        let started_at = Instant::now();

        let existing_id = match self.known_object(key) {
            Some(object) => object.id,
            None => self.lookup_remote(key)?.and_then(|object| object.id),
        };

        let notes = version_notes
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .unwrap_or(DEFAULT_VERSION_NOTES);
        let result = match existing_id {
            Some(id) => self.gateway.update_with_version(id, draft, notes),
            None => self.gateway.create(key.canonical(), draft),
        };

        let saved = match result {
            Ok(saved) => saved,
            Err(err) => {
                error!(
                    "event=content_save module=service status=error key={} duration_ms={} error={}",
                    key,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        info!(
            "event=content_save module=service status=ok key={} id={} mode={} duration_ms={}",
            key,
            saved.id.map(|id| id.to_string()).unwrap_or_default(),
            if existing_id.is_some() { "update" } else { "create" },
            started_at.elapsed().as_millis()
        );
        self.accept_local_write(key, saved.clone());
        Ok(saved)
    }

    /// Broadcasts `cache-invalidated` for one key or, with `None`, every key.
    pub fn invalidate(&self, key: Option<&LogicalKey>) {
        self.bus.publish(BroadcastEvent::cache_invalidated(
            key.map(LogicalKey::canonical),
        ));
    }

    /// Broadcasts a `special-update` for one key or every key.
    pub fn publish_special_update(&self, key: Option<&LogicalKey>, force_refresh: bool) {
        let event = BroadcastEvent::special_update(key.map(LogicalKey::canonical));
        self.bus.publish(if force_refresh {
            event.forcing_refresh()
        } else {
            event
        });
    }

    /// Explicitly clears the snapshot for `key`.
    pub fn reset_guard(&self, key: &LogicalKey) -> bool {
        self.guard
            .release(Some(key.canonical()), ReleaseReason::Explicit)
            > 0
    }

    /// Releases local state for a key a surface is navigating away from.
    pub fn release_key(&self, key: &LogicalKey) {
        self.guard
            .release(Some(key.canonical()), ReleaseReason::KeyChanged);
        let mut epochs = lock_or_recover(&self.epochs);
        epochs.bump(Some(key.canonical()));
        self.cache.invalidate(Some(key.canonical()));
    }

    /// Subscribes a handler to one event kind on this engine's bus.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&BroadcastEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    /// Tears the engine down: drops bus handlers, clears cache and guard.
    ///
    /// Later operations fail with [`SyncError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock_or_recover(&self.wiring).clear();
        self.bus.dispose();
        self.guard.release(None, ReleaseReason::Disposed);
        self.cache.invalidate(None);
        self.ledger.clear();
        info!("event=engine_dispose module=service status=ok");
    }

    /// Most trustworthy local copy: held snapshot first, then the cache.
    pub(crate) fn known_object(&self, key: &LogicalKey) -> Option<ContentObject> {
        match self.guard.state(key.canonical()) {
            GuardState::Held(snapshot) => Some(snapshot),
            GuardState::Empty => self
                .cache
                .get(key.canonical())
                .and_then(CacheValue::into_object),
        }
    }

    /// Records a confirmed local write: snapshot, cache, collection, event.
    pub(crate) fn accept_local_write(&self, key: &LogicalKey, saved: ContentObject) {
        let canonical = key.canonical();
        {
            let mut epochs = lock_or_recover(&self.epochs);
            epochs.bump(Some(canonical));
            epochs.bump(Some(ALL_CONTENT_KEY));
        }
        self.guard.hold(canonical, saved.clone());
        self.cache.set(canonical, CacheValue::Object(saved.clone()));

        let replaced = self.cache.update_in_collection(
            ALL_CONTENT_KEY,
            |item| item.id.is_some() && item.id == saved.id,
            saved.clone(),
        );
        if !replaced {
            self.cache.invalidate(Some(ALL_CONTENT_KEY));
        }

        self.bus
            .publish(BroadcastEvent::content_refreshed(canonical, saved));
    }

    /// Bumps the write epoch so in-flight reads for `key` commit nothing.
    pub(crate) fn supersede_reads(&self, key: &LogicalKey) {
        lock_or_recover(&self.epochs).bump(Some(key.canonical()));
    }

    /// Tries every candidate key, then scans the full listing.
    ///
    /// Errors from individual candidates do not stop the search, but they
    /// are returned when nothing is found.
    pub(crate) fn lookup_remote(&self, key: &LogicalKey) -> SyncResult<Option<ContentObject>> {
        self.ensure_live()?;
        let mut first_error: Option<GatewayError> = None;

        for candidate in key.candidates() {
            match self.gateway.fetch_by_key(candidate) {
                Ok(Some(object)) => {
                    debug!(
                        "event=content_lookup module=service status=ok key={} candidate={}",
                        key, candidate
                    );
                    return Ok(Some(object));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "event=content_lookup module=service status=error key={} candidate={} error={}",
                        key, candidate, err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match self.scan_listing(key) {
            Ok(Some(object)) => {
                info!(
                    "event=content_lookup module=service status=ok key={} source=listing",
                    key
                );
                Ok(Some(object))
            }
            Ok(None) => match first_error {
                Some(err) => Err(err.into()),
                None => Ok(None),
            },
            Err(err) => Err(first_error.unwrap_or(err).into()),
        }
    }

    /// Looks `key` up in a fresh full listing.
    ///
    /// The cached collection never answers a lookup. The fetched listing
    /// replaces it only if no write touched the collection meanwhile.
    fn scan_listing(&self, key: &LogicalKey) -> GatewayResult<Option<ContentObject>> {
        let epoch = lock_or_recover(&self.epochs).current(ALL_CONTENT_KEY);
        let all = self.gateway.fetch_all()?;
        let found = all
            .iter()
            .find(|item| key.matches_slug(&item.slug))
            .cloned();

        let epochs = lock_or_recover(&self.epochs);
        if epochs.current(ALL_CONTENT_KEY) == epoch {
            self.cache.set(ALL_CONTENT_KEY, CacheValue::Collection(all));
        } else {
            info!(
                "event=collection_commit module=service status=skipped reason=superseded key={}",
                key
            );
        }
        Ok(found)
    }

    pub(crate) fn ensure_live(&self) -> SyncResult<()> {
        if self.is_disposed() {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }
}

fn subscribe_cache_invalidation(
    bus: &Arc<EventBus>,
    cache: Arc<ContentCache>,
    epochs: SharedEpochs,
) -> Subscription {
    bus.subscribe(EventKind::CacheInvalidated, move |event| {
        let mut table = lock_or_recover(&epochs);
        table.bump(event.key.as_deref());
        cache.invalidate(event.key.as_deref());
        if event.key.is_none() {
            return;
        }
        // A keyed invalidation also makes the listing suspect.
        table.bump(Some(ALL_CONTENT_KEY));
        cache.invalidate(Some(ALL_CONTENT_KEY));
    })
}

fn subscribe_history_reset(bus: &Arc<EventBus>, guard: Arc<SnapshotGuard>) -> Subscription {
    bus.subscribe(EventKind::VersionHistoryReset, move |event| {
        guard.release(event.key.as_deref(), ReleaseReason::HistoryReset);
    })
}

fn lock_or_recover<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
