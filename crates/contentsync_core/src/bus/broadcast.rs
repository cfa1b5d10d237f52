//! Publish/subscribe channel with ordered, re-entrant-safe delivery.
//!
//! Delivery is synchronous on the publishing thread. An event published
//! while another event is being delivered is queued and delivered by the
//! outermost `publish` call once the current event reaches every handler,
//! which keeps per-`(kind, key)` ordering intact for nested publishes.

use crate::bus::event::{BroadcastEvent, EventKind};
use log::{debug, info, warn};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback invoked for each delivered event.
pub type EventHandler = Arc<dyn Fn(&BroadcastEvent) + Send + Sync>;

/// Opaque subscriber handle id, increasing in subscription order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<SubscriptionId, (EventKind, EventHandler)>,
    disposed: bool,
}

#[derive(Default)]
struct DeliveryQueue {
    delivering: bool,
    pending: VecDeque<BroadcastEvent>,
}

/// Process-wide event bus; construct one per engine and share it by `Arc`.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
    queue: Mutex<DeliveryQueue>,
}

impl EventBus {
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `handler` for one event kind.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed. Subscribing to a disposed bus returns an
    /// inert subscription.
    pub fn subscribe<F>(self: &Arc<Self>, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&BroadcastEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock_registry();
        if registry.disposed {
            return Subscription::inert();
        }
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.handlers.insert(id, (kind, Arc::new(handler)));
        debug!("event=bus_subscribe module=bus status=ok kind={kind} subscription={}", id.0);
        Subscription {
            id: Some(id),
            bus: Arc::downgrade(self),
        }
    }

    /// Delivers `event` to every handler subscribed to its kind.
    pub fn publish(&self, event: BroadcastEvent) {
        if self.lock_registry().disposed {
            debug!(
                "event=bus_publish module=bus status=skipped reason=disposed kind={}",
                event.kind
            );
            return;
        }

        {
            let mut queue = self.lock_queue();
            queue.pending.push_back(event);
            if queue.delivering {
                return;
            }
            queue.delivering = true;
        }

        let _delivery = DeliveryGuard { bus: self };
        loop {
            let next = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.delivering = false;
                        break;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock_registry()
            .handlers
            .values()
            .filter(|(handler_kind, _)| *handler_kind == kind)
            .count()
    }

    /// Drops every handler and turns later publishes into no-ops.
    pub fn dispose(&self) {
        let mut registry = self.lock_registry();
        let dropped = registry.handlers.len();
        registry.handlers.clear();
        registry.disposed = true;
        self.lock_queue().pending.clear();
        info!("event=bus_dispose module=bus status=ok dropped_handlers={dropped}");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock_registry().disposed
    }

    fn deliver(&self, event: &BroadcastEvent) {
        let handlers: Vec<EventHandler> = self
            .lock_registry()
            .handlers
            .values()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        debug!(
            "event=bus_publish module=bus status=ok kind={} key={} handlers={}",
            event.kind,
            event.key_label(),
            handlers.len()
        );
        for handler in handlers {
            handler(event);
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.lock_registry().handlers.remove(&id).is_some() {
            debug!("event=bus_unsubscribe module=bus status=ok subscription={}", id.0);
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_queue(&self) -> MutexGuard<'_, DeliveryQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hands delivery back to the next `publish` if a handler unwinds.
///
/// Events still pending stay queued and go out, in order, with the next
/// publish.
struct DeliveryGuard<'a> {
    bus: &'a EventBus,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut queue = self.bus.lock_queue();
        queue.delivering = false;
        warn!(
            "event=bus_publish module=bus status=error reason=handler_panicked pending={}",
            queue.pending.len()
        );
    }
}

/// Live registration on an [`EventBus`]; unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes its handler"]
pub struct Subscription {
    id: Option<SubscriptionId>,
    bus: Weak<EventBus>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            id: None,
            bus: Weak::new(),
        }
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.bus.strong_count() > 0
    }

    /// Removes the handler now instead of at drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(bus)) = (self.id.take(), self.bus.upgrade()) {
            bus.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
