use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identifier handed out for every registered listener
/// Ids are monotonic, so iteration order over the registry is registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Listener<T: ?Sized> {
    active: AtomicBool,
    callback: Box<dyn Fn(&T) + Send + Sync>,
}

/// Result of one dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Listeners whose callback returned normally
    pub delivered: usize,
    /// Listeners whose callback panicked
    pub failed: usize,
}

/// Registry of callbacks keyed by generated id
///
/// Dispatch copies the current listener set before invoking anything, so
/// callbacks may subscribe or unsubscribe (themselves included) while an
/// event is being delivered. A listener removed mid-dispatch is skipped for
/// the rest of that pass.
pub struct Listeners<T: ?Sized> {
    entries: RwLock<BTreeMap<ListenerId, Arc<Listener<T>>>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Listeners {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback, returning its id
    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener = Arc::new(Listener {
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });
        self.entries.write().insert(id, listener);
        id
    }

    /// Remove a listener by id. Returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        match self.entries.write().remove(&id) {
            Some(listener) => {
                listener.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every active listener with `value`, in registration order
    /// A panicking callback is logged and counted; the remaining listeners still run
    pub fn dispatch(&self, value: &T) -> Dispatch {
        let snapshot: Vec<(ListenerId, Arc<Listener<T>>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut dispatch = Dispatch::default();
        for (id, listener) in snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| (listener.callback)(value))) {
                Ok(()) => dispatch.delivered += 1,
                Err(payload) => {
                    dispatch.failed += 1;
                    log::error!(
                        "Listener {} panicked during dispatch: {}",
                        id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        dispatch
    }
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Detach handle for a single listener
///
/// Holds only a weak reference to the registry, so an outstanding handle
/// never keeps a relay or store alive. Dropping the handle does NOT detach
/// the listener; call [`Subscription::unsubscribe`].
#[must_use = "dropping a Subscription leaves the listener attached; call unsubscribe() to detach it"]
pub struct Subscription<T: ?Sized> {
    listeners: Weak<Listeners<T>>,
    id: ListenerId,
}

impl<T: ?Sized> Subscription<T> {
    pub(crate) fn new(listeners: &Arc<Listeners<T>>, id: ListenerId) -> Self {
        Subscription {
            listeners: Arc::downgrade(listeners),
            id,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Detach this listener. Safe to call more than once
    /// Returns true only on the call that actually removed it
    pub fn unsubscribe(&self) -> bool {
        match self.listeners.upgrade() {
            Some(listeners) => listeners.remove(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|listeners| listeners.contains(self.id))
    }
}

impl<T: ?Sized> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Best-effort text for a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_registration_order() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            listeners.add(move |value: &u32| seen.lock().push((tag, *value)));
        }

        let dispatch = listeners.dispatch(&7);
        assert_eq!(dispatch, Dispatch { delivered: 3, failed: 0 });
        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let id = listeners.add(|_| {});
        let subscription = Subscription::new(&listeners, id);

        assert!(subscription.is_active());
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_listener_removed_mid_dispatch_is_skipped() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let later_calls = Arc::new(Mutex::new(0));

        // The first listener detaches the second before it runs
        let registry = Arc::downgrade(&listeners);
        let victim = Arc::new(Mutex::new(None::<ListenerId>));
        {
            let victim = Arc::clone(&victim);
            listeners.add(move |_| {
                if let (Some(registry), Some(id)) = (registry.upgrade(), *victim.lock()) {
                    registry.remove(id);
                }
            });
        }
        let calls = Arc::clone(&later_calls);
        let id = listeners.add(move |_| *calls.lock() += 1);
        *victim.lock() = Some(id);

        let dispatch = listeners.dispatch(&1);
        assert_eq!(dispatch.delivered, 1);
        assert_eq!(*later_calls.lock(), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch_does_not_deadlock() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let registry = Arc::downgrade(&listeners);
        listeners.add(move |_| {
            if let Some(registry) = registry.upgrade() {
                registry.add(|_| {});
            }
        });

        listeners.dispatch(&1);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::new());
        let id = listeners.add(|_| {});
        let subscription = Subscription::new(&listeners, id);
        drop(listeners);

        assert!(!subscription.is_active());
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
