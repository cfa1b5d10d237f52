//! Editing surface controller.
//!
//! Modes: `Viewing -> Editing(draft) -> Saving -> Viewing`. A failed save
//! returns to `Editing` with the draft intact.
//!
//! The surface listens for `content-refreshed` and `special-update`
//! (throttled per `(kind, key)`) and `cache-invalidated` (not throttled).
//! Events for a key the surface is refreshing or saving itself are ignored.

use crate::bus::broadcast::Subscription;
use crate::bus::event::{BroadcastEvent, EventKind};
use crate::bus::throttle::{InFlightKeys, RefreshThrottle};
use crate::gateway::transport::ContentTransport;
use crate::identity::resolver::LogicalKey;
use crate::model::content::{ContentDraft, ContentObject};
use crate::model::version::ContentVersion;
use crate::service::content_service::{ContentRead, ContentSyncService, SyncError, SyncResult};
use crate::service::version_history::{
    HistorySubject, RestoreConfirmation, RestoreOutcome, VersionPreview,
};
use crate::surface::capability::{CapabilityProvider, SurfaceCapability};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Edit-mode state of one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    Viewing,
    Editing(ContentDraft),
    Saving,
}

struct SurfaceState {
    key: Option<LogicalKey>,
    mode: EditMode,
    read: ContentRead,
    throttle: RefreshThrottle,
    processed_refreshes: u64,
}

struct SurfaceShared<T: ContentTransport> {
    id: Uuid,
    service: Arc<ContentSyncService<T>>,
    state: Mutex<SurfaceState>,
    in_flight: InFlightKeys,
}

/// One editable view over the engine.
pub struct EditingSurface<T: ContentTransport + 'static> {
    shared: Arc<SurfaceShared<T>>,
    capabilities: Arc<dyn CapabilityProvider>,
    _subscriptions: Vec<Subscription>,
}

impl<T: ContentTransport + 'static> EditingSurface<T> {
    pub fn new(
        service: Arc<ContentSyncService<T>>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        let throttle = RefreshThrottle::new(service.refresh_throttle());
        let shared = Arc::new(SurfaceShared {
            id: Uuid::new_v4(),
            service,
            state: Mutex::new(SurfaceState {
                key: None,
                mode: EditMode::Viewing,
                read: ContentRead::default(),
                throttle,
                processed_refreshes: 0,
            }),
            in_flight: InFlightKeys::new(),
        });

        let subscriptions: Vec<Subscription> = [
            EventKind::ContentRefreshed,
            EventKind::SpecialUpdate,
            EventKind::CacheInvalidated,
        ]
        .into_iter()
        .map(|kind| {
            let listener = Arc::clone(&shared);
            shared
                .service
                .subscribe(kind, move |event| listener.on_event(event))
        })
        .collect();

        debug!(
            "event=surface_create module=surface status=ok surface={}",
            shared.id
        );
        Self {
            shared,
            capabilities,
            _subscriptions: subscriptions,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Binds the surface to `(slug, section)` and loads it.
    ///
    /// Switching away from a key releases that key's snapshot and cache
    /// entry. Reopening the bound key only reloads it; the edit mode and
    /// any draft survive. An empty slug leaves the surface blank.
    pub fn open(&self, slug: &str, section: Option<&str>) -> ContentRead {
        let next = LogicalKey::new(slug, section);
        let previous = {
            let mut state = self.shared.lock_state();
            if next.is_some() && state.key == next {
                state.read.is_loading = true;
                None
            } else {
                let previous = state.key.take();
                if let Some(previous) = &previous {
                    state.throttle.forget(previous.canonical());
                }
                state.key = next.clone();
                state.mode = EditMode::Viewing;
                state.read = ContentRead {
                    is_loading: next.is_some(),
                    ..ContentRead::default()
                };
                previous
            }
        };

        if let Some(previous) = previous.filter(|previous| Some(previous) != next.as_ref()) {
            info!(
                "event=surface_switch module=surface status=ok surface={} from={} to={}",
                self.shared.id,
                previous,
                next.as_ref().map(LogicalKey::canonical).unwrap_or("-")
            );
            self.shared.service.release_key(&previous);
        }

        match next {
            Some(key) => self.shared.load(&key, false),
            None => ContentRead::default(),
        }
    }

    /// Current read state.
    pub fn view(&self) -> ContentRead {
        self.shared.lock_state().read.clone()
    }

    pub fn mode(&self) -> EditMode {
        self.shared.lock_state().mode.clone()
    }

    pub fn key(&self) -> Option<LogicalKey> {
        self.shared.lock_state().key.clone()
    }

    /// Refresh events this surface has acted on.
    pub fn processed_refreshes(&self) -> u64 {
        self.shared.lock_state().processed_refreshes
    }

    /// Enters edit mode with a draft of the current value.
    pub fn begin_edit(&self) -> SyncResult<ContentDraft> {
        self.require(SurfaceCapability::Edit)?;
        let mut state = self.shared.lock_state();
        if state.key.is_none() {
            return Err(SyncError::NoIdentity);
        }
        let draft = match &state.mode {
            EditMode::Editing(draft) => draft.clone(),
            EditMode::Saving => return Err(SyncError::InvalidState("save in progress")),
            EditMode::Viewing => state
                .read
                .value
                .as_ref()
                .map(ContentDraft::from_object)
                .unwrap_or_default(),
        };
        state.mode = EditMode::Editing(draft.clone());
        Ok(draft)
    }

    /// Replaces the working draft.
    pub fn update_draft(&self, draft: ContentDraft) -> SyncResult<()> {
        let mut state = self.shared.lock_state();
        match state.mode {
            EditMode::Editing(_) => {
                state.mode = EditMode::Editing(draft);
                Ok(())
            }
            _ => Err(SyncError::InvalidState("not editing")),
        }
    }

    /// Leaves edit mode, discarding the draft.
    pub fn cancel_edit(&self) {
        let mut state = self.shared.lock_state();
        if matches!(state.mode, EditMode::Editing(_)) {
            state.mode = EditMode::Viewing;
        }
    }

    /// Saves the working draft.
    pub fn submit(&self, version_notes: Option<&str>) -> SyncResult<ContentObject> {
        self.require(SurfaceCapability::Edit)?;
        let (key, draft) = {
            let mut state = self.shared.lock_state();
            let Some(key) = state.key.clone() else {
                return Err(SyncError::NoIdentity);
            };
            let EditMode::Editing(draft) = state.mode.clone() else {
                return Err(SyncError::InvalidState("not editing"));
            };
            draft.validate()?;
            state.mode = EditMode::Saving;
            (key, draft)
        };

        let token = self.shared.in_flight.try_begin(key.canonical());
        let result = self.shared.service.save(&key, &draft, version_notes);
        drop(token);

        let mut state = self.shared.lock_state();
        match &result {
            Ok(saved) => {
                state.mode = EditMode::Viewing;
                if state.key.as_ref() == Some(&key) {
                    state.read = ContentRead::ready(Some(saved.clone()));
                }
            }
            Err(err) => {
                state.mode = EditMode::Editing(draft);
                state.read.error = Some(err.clone());
            }
        }
        result
    }

    /// Re-reads the bound key from the remote store.
    pub fn refresh(&self) -> ContentRead {
        match self.key() {
            Some(key) => self.shared.load(&key, true),
            None => ContentRead::default(),
        }
    }

    /// Lists the bound key's versions, newest first.
    pub fn versions(&self) -> SyncResult<Vec<ContentVersion>> {
        self.require(SurfaceCapability::ViewHistory)?;
        let key = self.key().ok_or(SyncError::NoIdentity)?;
        self.shared
            .service
            .list_versions(&HistorySubject::Key(key))
    }

    pub fn preview(&self, version_id: i64) -> SyncResult<VersionPreview> {
        self.require(SurfaceCapability::ViewHistory)?;
        self.shared.service.preview_listed(version_id)
    }

    /// Restores a listed version; corrupted versions need `Confirmed`.
    pub fn restore(
        &self,
        version_id: i64,
        confirmation: RestoreConfirmation,
    ) -> SyncResult<RestoreOutcome> {
        self.require(SurfaceCapability::ViewHistory)?;
        self.require(SurfaceCapability::Edit)?;
        let key = self.key().ok_or(SyncError::NoIdentity)?;

        let token = self.shared.in_flight.try_begin(key.canonical());
        let outcome = self
            .shared
            .service
            .restore_version(version_id, confirmation);
        drop(token);

        if let Ok(RestoreOutcome::Restored(restored)) = &outcome {
            let mut state = self.shared.lock_state();
            if state.key.as_ref() == Some(&key) {
                state.mode = EditMode::Viewing;
                state.read = ContentRead::ready(Some(restored.clone()));
            }
        }
        outcome
    }

    fn require(&self, capability: SurfaceCapability) -> SyncResult<()> {
        if self.capabilities.is_permitted(capability) {
            return Ok(());
        }
        info!(
            "event=capability_check module=surface status=denied surface={} capability={}",
            self.shared.id,
            capability.as_str()
        );
        Err(SyncError::CapabilityDenied(capability))
    }
}

impl<T: ContentTransport> SurfaceShared<T> {
    fn lock_state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reads `key` and stores the result if the key is still active.
    fn load(&self, key: &LogicalKey, force: bool) -> ContentRead {
        let Some(token) = self.in_flight.try_begin(key.canonical()) else {
            return self.lock_state().read.clone();
        };
        self.lock_state().read.is_loading = true;

        let read = if force {
            self.service.refresh_key(key)
        } else {
            self.service.get_content_for_key(key)
        };
        drop(token);

        let mut state = self.lock_state();
        if state.key.as_ref() != Some(key) {
            debug!(
                "event=surface_load module=surface status=skipped reason=key_changed surface={} key={}",
                self.id, key
            );
            return read;
        }
        state.read = read.clone();
        read
    }

    fn on_event(&self, event: &BroadcastEvent) {
        let key = {
            let mut state = self.lock_state();
            let Some(key) = state.key.clone() else {
                return;
            };
            if !event.applies_to(key.canonical()) {
                return;
            }
            if self.in_flight.is_in_flight(key.canonical()) {
                debug!(
                    "event=surface_event module=surface status=skipped reason=in_flight surface={} kind={} key={}",
                    self.id, event.kind, key
                );
                return;
            }
            if event.kind.is_refresh_class()
                && !state.throttle.should_process(event.kind, key.canonical())
            {
                debug!(
                    "event=surface_event module=surface status=skipped reason=throttled surface={} kind={} key={}",
                    self.id, event.kind, key
                );
                return;
            }

            if event.kind.is_refresh_class() && !event.force_refresh {
                if let Some(payload) = &event.payload {
                    state.read = ContentRead::ready(Some(payload.clone()));
                    state.processed_refreshes += 1;
                    return;
                }
            }
            key
        };

        let force = event.kind.is_refresh_class();
        let read = self.load(&key, force);
        if read.error.is_none() {
            self.lock_state().processed_refreshes += 1;
        }
    }
}
