//! # Event Channel
//!
//! Per-kind subscriber lists for `start`, `progress`, `end` and `error`.
//!
//! - Delivery is synchronous, in subscription order.
//! - A panicking subscriber is logged and skipped; the rest still run.
//! - Subscribers may call back into the engine (e.g. `replay()` from an
//!   `end` handler); no channel lock is held while they run.
//! - Every delivered event is also published on the broadcast
//!   [`EventBus`], when one is attached.

use crate::arbiter::RequestId;
use core_runtime::events::{CoreEvent, EventBus, EventKind, SnippetEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

type Callback = Arc<dyn Fn(&SnippetEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<EventKind, Vec<Subscriber>>>,
}

impl Registry {
    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        before != list.len()
    }
}

/// Fan-out of lifecycle events to subscribers.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Registry>,
    bus: Option<EventBus>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every emitted event onto `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Register `callback` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&SnippetEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .subscribers
            .lock()
            .entry(kind)
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .subscribers
            .lock()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of its kind, then to the bus.
    pub fn emit(&self, request_id: RequestId, event: SnippetEvent) {
        let callbacks: Vec<Callback> = self
            .registry
            .subscribers
            .lock()
            .get(&event.kind())
            .map(|list| list.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default();

        trace!(request_id = request_id.get(), ?event, subscribers = callbacks.len(), "Emitting");

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!(
                    request_id = request_id.get(),
                    kind = ?event.kind(),
                    "Event subscriber panicked"
                );
            }
        }

        if let Some(bus) = &self.bus {
            // No receivers is not an error for the engine.
            let _ = bus.emit(CoreEvent::Snippet {
                request_id: request_id.get(),
                event,
            });
        }
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.subscriber_count(*kind)))
            .collect();
        f.debug_struct("EventChannel")
            .field("subscribers", &counts)
            .field("has_bus", &self.bus.is_some())
            .finish()
    }
}

/// Handle returned by [`EventChannel::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`dispose`](Self::dispose) to remove it.
#[derive(Debug)]
#[must_use = "keep the Subscription to be able to dispose of it"]
pub struct Subscription {
    registry: Weak<Registry>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the subscriber. Returns `false` if it was already gone.
    pub fn dispose(self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.remove(self.kind, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::Arbiter;
    use std::sync::atomic::AtomicUsize;

    fn request_id() -> RequestId {
        Arbiter::new().mint().0
    }

    #[test]
    fn delivers_in_subscription_order() {
        let channel = EventChannel::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            let _ = channel.subscribe(EventKind::End, move |_| log.lock().push(tag));
        }

        channel.emit(request_id(), SnippetEvent::End);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_notified() {
        let channel = EventChannel::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&starts);
        let _sub = channel.subscribe(EventKind::Start, move |event| {
            assert!(matches!(event, SnippetEvent::Start { duration_ms: 1000 }));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.emit(request_id(), SnippetEvent::Progress { elapsed_ms: 5 });
        channel.emit(request_id(), SnippetEvent::Start { duration_ms: 1000 });
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let channel = EventChannel::new();
        let reached = Arc::new(AtomicUsize::new(0));

        let _bad = channel.subscribe(EventKind::End, |_| panic!("subscriber bug"));
        let counter = Arc::clone(&reached);
        let _good = channel.subscribe(EventKind::End, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.emit(request_id(), SnippetEvent::End);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_removes_subscriber() {
        let channel = EventChannel::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = channel.subscribe(EventKind::Progress, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(channel.subscriber_count(EventKind::Progress), 1);

        assert!(sub.dispose());
        channel.emit(request_id(), SnippetEvent::Progress { elapsed_ms: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscriber_count(EventKind::Progress), 0);
    }

    #[test]
    fn subscriber_may_subscribe_during_delivery() {
        let channel = EventChannel::new();
        let inner = channel.clone();
        let _sub = channel.subscribe(EventKind::End, move |_| {
            let _ = inner.subscribe(EventKind::End, |_| {});
        });

        channel.emit(request_id(), SnippetEvent::End);
        assert_eq!(channel.subscriber_count(EventKind::End), 2);
    }

    #[tokio::test]
    async fn events_are_mirrored_on_the_bus() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let channel = EventChannel::new().with_bus(bus);
        let id = request_id();

        channel.emit(id, SnippetEvent::Start { duration_ms: 500 });

        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Snippet {
                request_id: id.get(),
                event: SnippetEvent::Start { duration_ms: 500 },
            }
        );
    }
}
