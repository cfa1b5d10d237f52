//! Per-key `Empty -> Held -> Empty` state machine.
//!
//! Transitions into `Held` happen only after a successful save or restore.
//! Transitions back to `Empty` happen on logical-key change, on a matching
//! (or global) `version-history-reset` event, or on explicit reset.

use crate::model::content::ContentObject;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Guard state for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Empty,
    Held(ContentObject),
}

/// Result of offering a fetched value to the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No snapshot is held; the fetched value may be committed.
    Accept(Option<ContentObject>),
    /// A snapshot is held; it must be committed instead of the fetched value.
    Shadowed(ContentObject),
}

/// Why a snapshot was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    KeyChanged,
    HistoryReset,
    Explicit,
    Disposed,
}

impl ReleaseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyChanged => "key_changed",
            Self::HistoryReset => "history_reset",
            Self::Explicit => "explicit",
            Self::Disposed => "disposed",
        }
    }
}

#[derive(Debug, Default)]
pub struct SnapshotGuard {
    snapshots: Mutex<HashMap<String, ContentObject>>,
}

impl SnapshotGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &str) -> GuardState {
        match self.lock().get(key) {
            Some(snapshot) => GuardState::Held(snapshot.clone()),
            None => GuardState::Empty,
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Enters (or refreshes) `Held` with the server-returned object.
    ///
    /// A newer snapshot supersedes any previous one for the same key.
    pub fn hold(&self, key: &str, snapshot: ContentObject) {
        let superseded = self.lock().insert(key.to_string(), snapshot).is_some();
        debug!("event=guard_hold module=guard status=ok key={key} superseded={superseded}");
    }

    /// Returns to `Empty` for one key, or for every key when `key` is `None`.
    ///
    /// Returns how many snapshots were released.
    pub fn release(&self, key: Option<&str>, reason: ReleaseReason) -> usize {
        let mut snapshots = self.lock();
        let released = match key {
            Some(key) => usize::from(snapshots.remove(key).is_some()),
            None => {
                let count = snapshots.len();
                snapshots.clear();
                count
            }
        };
        if released > 0 {
            info!(
                "event=guard_release module=guard status=ok key={} reason={} released={}",
                key.unwrap_or("*"),
                reason.as_str(),
                released
            );
        }
        released
    }

    /// Offers a fetched value for `key`; the snapshot wins while held.
    pub fn admit(&self, key: &str, fetched: Option<ContentObject>) -> Admission {
        match self.lock().get(key) {
            Some(snapshot) => {
                debug!("event=guard_shadow module=guard status=ok key={key}");
                Admission::Shadowed(snapshot.clone())
            }
            None => Admission::Accept(fetched),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ContentObject>> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
