//! Keyed in-memory store of content objects.

use crate::model::content::{ContentId, ContentObject};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Reserved key holding the result of the last full listing.
pub const ALL_CONTENT_KEY: &str = "__all_content__";

/// Cached value for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// The remote store confirmed there is no object for the key.
    Absent,
    Object(ContentObject),
    /// Collection-valued entry such as [`ALL_CONTENT_KEY`].
    Collection(Vec<ContentObject>),
}

impl CacheValue {
    /// The single object held by this entry, if any.
    pub fn as_object(&self) -> Option<&ContentObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Absent | Self::Collection(_) => None,
        }
    }

    pub fn into_object(self) -> Option<ContentObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Absent | Self::Collection(_) => None,
        }
    }
}

impl From<Option<ContentObject>> for CacheValue {
    fn from(value: Option<ContentObject>) -> Self {
        match value {
            Some(object) => Self::Object(object),
            None => Self::Absent,
        }
    }
}

/// Process-wide cache shared by every surface of one engine instance.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: Mutex<HashMap<String, CacheValue>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, or `None` when the key is not cached.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        self.lock().get(key).cloned()
    }

    /// Overwrites the entry unconditionally.
    pub fn set(&self, key: &str, value: CacheValue) {
        debug!("event=cache_set module=cache status=ok key={key}");
        self.lock().insert(key.to_string(), value);
    }

    /// Removes one entry, or every entry when `key` is `None`.
    ///
    /// Returns how many entries were removed.
    pub fn invalidate(&self, key: Option<&str>) -> usize {
        let mut entries = self.lock();
        let removed = match key {
            Some(key) => usize::from(entries.remove(key).is_some()),
            None => {
                let count = entries.len();
                entries.clear();
                count
            }
        };
        debug!(
            "event=cache_invalidate module=cache status=ok key={} removed={}",
            key.unwrap_or("*"),
            removed
        );
        removed
    }

    /// Replaces the first element of a collection entry matching `predicate`.
    ///
    /// No-op when the entry is missing, not a collection, or has no match.
    /// Returns whether an element was replaced.
    pub fn update_in_collection<P>(
        &self,
        collection_key: &str,
        predicate: P,
        new_value: ContentObject,
    ) -> bool
    where
        P: Fn(&ContentObject) -> bool,
    {
        let mut entries = self.lock();
        let Some(CacheValue::Collection(items)) = entries.get_mut(collection_key) else {
            return false;
        };
        match items.iter_mut().find(|item| predicate(item)) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        }
    }

    /// Finds a single-object entry by remote id.
    pub fn find_by_id(&self, id: ContentId) -> Option<(String, ContentObject)> {
        self.lock().iter().find_map(|(key, value)| match value {
            CacheValue::Object(object) if object.id == Some(id) => {
                Some((key.clone(), object.clone()))
            }
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheValue>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
