use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Token returned by [`ListenerRegistry::subscribe`]; pass it back to
/// [`ListenerRegistry::unsubscribe`] to stop receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An instance-owned observer registry with synchronous delivery.
///
/// Each listener runs in isolation: a listener that panics is logged and
/// skipped, and never aborts the emitting operation or later listeners.
pub struct ListenerRegistry<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(Subscription, Listener<E>)>>,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let sub = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((sub, Arc::new(listener)));
        sub
    }

    /// Returns `false` if the subscription was already removed.
    pub fn unsubscribe(&self, sub: Subscription) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(s, _)| *s != sub);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver `event` to every current subscriber in subscription order.
    /// Returns how many listeners panicked.
    pub fn emit(&self, event: &E) -> usize {
        // Snapshot so listeners may (un)subscribe while being called.
        let snapshot: Vec<(Subscription, Listener<E>)> = self
            .listeners
            .lock()
            .iter()
            .map(|(s, l)| (*s, Arc::clone(l)))
            .collect();

        let mut failed = 0;
        for (sub, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(subscription = sub.0, "change listener panicked, ignoring");
                failed += 1;
            }
        }
        failed
    }
}
