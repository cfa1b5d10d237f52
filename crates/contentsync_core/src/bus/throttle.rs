//! Subscriber-side refresh throttle and in-flight guard.
//!
//! Both are owned by one subscriber. The throttle drops a repeat of the same
//! `(kind, key)` inside the window after the last processed one; the
//! in-flight guard drops every event for a key while that subscriber is
//! still running its own refresh of it.

use crate::bus::event::EventKind;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Time-window filter for refresh-class events.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    window: Duration,
    last_processed: HashMap<(EventKind, String), Instant>,
}

impl RefreshThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_processed: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns whether the event should be processed now, recording it if so.
    pub fn should_process(&mut self, kind: EventKind, key: &str) -> bool {
        self.should_process_at(kind, key, Instant::now())
    }

    /// Same as [`RefreshThrottle::should_process`] at an explicit instant.
    pub fn should_process_at(&mut self, kind: EventKind, key: &str, now: Instant) -> bool {
        let slot = (kind, key.to_string());
        if let Some(previous) = self.last_processed.get(&slot) {
            if now.saturating_duration_since(*previous) < self.window {
                return false;
            }
        }
        self.last_processed.insert(slot, now);
        true
    }

    /// Forgets history for one key, e.g. after the subscriber switches keys.
    pub fn forget(&mut self, key: &str) {
        self.last_processed.retain(|(_, tracked), _| tracked != key);
    }
}

/// Shared set of keys a subscriber is currently refreshing.
#[derive(Debug, Clone, Default)]
pub struct InFlightKeys {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` in flight; `None` if it already is.
    ///
    /// The mark is cleared when the returned token drops.
    pub fn try_begin(&self, key: &str) -> Option<InFlightToken> {
        if !self.lock().insert(key.to_string()) {
            return None;
        }
        Some(InFlightToken {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks one key in flight until dropped.
#[derive(Debug)]
pub struct InFlightToken {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightToken {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::{InFlightKeys, RefreshThrottle};
    use crate::bus::event::EventKind;
    use std::time::{Duration, Instant};

    #[test]
    fn repeat_inside_window_is_dropped() {
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        let start = Instant::now();
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "about", start));
        assert!(!throttle.should_process_at(
            EventKind::ContentRefreshed,
            "about",
            start + Duration::from_millis(400)
        ));
        assert!(throttle.should_process_at(
            EventKind::ContentRefreshed,
            "about",
            start + Duration::from_millis(1_000)
        ));
    }

    #[test]
    fn window_is_tracked_per_kind_and_key() {
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        let now = Instant::now();
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "about", now));
        assert!(throttle.should_process_at(EventKind::SpecialUpdate, "about", now));
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "team", now));
    }

    #[test]
    fn dropped_event_does_not_extend_window() {
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        let start = Instant::now();
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "k", start));
        assert!(!throttle.should_process_at(
            EventKind::ContentRefreshed,
            "k",
            start + Duration::from_millis(900)
        ));
        assert!(throttle.should_process_at(
            EventKind::ContentRefreshed,
            "k",
            start + Duration::from_millis(1_100)
        ));
    }

    #[test]
    fn forget_resets_key_history() {
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        let now = Instant::now();
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "k", now));
        throttle.forget("k");
        assert!(throttle.should_process_at(EventKind::ContentRefreshed, "k", now));
    }

    #[test]
    fn in_flight_token_blocks_until_dropped() {
        let in_flight = InFlightKeys::new();
        let token = in_flight.try_begin("about").expect("first begin succeeds");
        assert_eq!(token.key(), "about");
        assert!(in_flight.try_begin("about").is_none());
        assert!(in_flight.try_begin("team").is_some());

        drop(token);
        assert!(!in_flight.is_in_flight("about"));
        assert!(in_flight.try_begin("about").is_some());
    }
}
