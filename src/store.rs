//! Per-key lifecycle state with change subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use slab::Slab;

use crate::state::LifecycleState;
use crate::tracer::{NoopTracer, Tracer};

/// Callback invoked with `(key, previous, current)` when a state changes.
pub type StateListener = Arc<dyn Fn(&str, LifecycleState, LifecycleState) + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

struct Subscriber {
    /// `None` listens to every key.
    key: Option<Arc<str>>,
    listener: StateListener,
}

/// Single source of truth for the lifecycle state of every key.
///
/// Reads are pull-based: [`StateStore::get_state`] always reflects the latest
/// write. Writes that change a state are pushed to subscribers after the map
/// and subscriber locks are released, so a listener may read or write the store.
///
/// Writes and their notifications are serialized across threads: listeners see
/// changes in the order they were stored, and each `previous` is the `current`
/// of the change before it. A write made from inside a listener is delivered
/// before the remaining listeners of the outer write run. A listener must not
/// block on another thread that writes the same store.
pub struct StateStore {
    states: RwLock<HashMap<Arc<str>, LifecycleState>>,
    /// Held from a write until its notifications are delivered.
    write_order: ReentrantMutex<()>,
    subscribers: Mutex<Slab<Subscriber>>,
    tracer: Arc<dyn Tracer>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::with_tracer(Arc::new(NoopTracer))
    }
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store reporting state changes to `tracer`.
    pub fn with_tracer(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            write_order: ReentrantMutex::new(()),
            subscribers: Mutex::new(Slab::new()),
            tracer,
        }
    }

    /// Overwrite the state of `key`.
    ///
    /// Any state may follow any other. Subscribers are only notified when the
    /// stored value actually changes.
    pub fn set_state(&self, key: &str, state: LifecycleState) {
        let _order = self.write_order.lock();
        let previous = {
            let mut states = self.states.write();
            match states.get_mut(key) {
                Some(current) => std::mem::replace(current, state),
                None => {
                    states.insert(Arc::from(key), state);
                    LifecycleState::Idle
                }
            }
        };
        if previous != state {
            self.tracer.on_state_change(key, previous, state);
            self.notify(key, previous, state);
        }
    }

    /// Current state of `key`, `Idle` if it was never set.
    pub fn get_state(&self, key: &str) -> LifecycleState {
        self.states.read().get(key).copied().unwrap_or_default()
    }

    /// Returns `true` if `key` is currently in `candidate`.
    pub fn is_in_state(&self, key: &str, candidate: LifecycleState) -> bool {
        self.get_state(key) == candidate
    }

    /// Forget the state of `key`, which reads as `Idle` afterwards.
    ///
    /// Subscribers see the change to `Idle` if the key was in another state.
    pub fn remove(&self, key: &str) -> bool {
        let _order = self.write_order.lock();
        let previous = self.states.write().remove(key);
        if let Some(previous) = previous {
            if previous != LifecycleState::Idle {
                self.tracer
                    .on_state_change(key, previous, LifecycleState::Idle);
                self.notify(key, previous, LifecycleState::Idle);
            }
        }
        previous.is_some()
    }

    /// Forget every state. Subscribers are not notified.
    pub fn clear(&self) {
        let _order = self.write_order.lock();
        self.states.write().clear();
    }

    /// Number of keys with a stored state.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// Returns `true` if no key has a stored state.
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Listen to state changes of `key`.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&str, LifecycleState, LifecycleState) + Send + Sync + 'static,
    {
        self.insert_subscriber(Some(Arc::from(key)), Arc::new(listener))
    }

    /// Listen to state changes of every key.
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&str, LifecycleState, LifecycleState) + Send + Sync + 'static,
    {
        self.insert_subscriber(None, Arc::new(listener))
    }

    /// Stop a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().try_remove(id.0).is_some()
    }

    /// Bind a handle to one key.
    pub fn promise_state(self: &Arc<Self>, key: impl Into<Arc<str>>) -> PromiseState {
        PromiseState {
            key: key.into(),
            store: self.clone(),
        }
    }

    fn insert_subscriber(&self, key: Option<Arc<str>>, listener: StateListener) -> SubscriptionId {
        SubscriptionId(self.subscribers.lock().insert(Subscriber { key, listener }))
    }

    fn notify(&self, key: &str, previous: LifecycleState, current: LifecycleState) {
        let listeners: Vec<StateListener> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|(_, s)| s.key.as_deref().map_or(true, |k| k == key))
                .map(|(_, s)| s.listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(key, previous, current);
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("states", &*self.states.read())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// A [`StateStore`] handle bound to one key.
#[derive(Clone)]
pub struct PromiseState {
    key: Arc<str>,
    store: Arc<StateStore>,
}

impl PromiseState {
    /// The bound key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Overwrite the state of the bound key.
    pub fn set(&self, state: LifecycleState) {
        self.store.set_state(&self.key, state);
    }

    /// Returns `true` if the bound key is in `state`.
    pub fn matches(&self, state: LifecycleState) -> bool {
        self.store.is_in_state(&self.key, state)
    }

    /// Current state of the bound key.
    pub fn state(&self) -> LifecycleState {
        self.store.get_state(&self.key)
    }

    /// Returns `true` while the bound key is pending.
    pub fn is_loading(&self) -> bool {
        self.matches(LifecycleState::Pending)
    }
}

impl std::fmt::Debug for PromiseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseState")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(store: &StateStore, key: &str) -> Arc<Mutex<Vec<LifecycleState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(key, move |_, _, current| sink.lock().push(current));
        seen
    }

    #[test]
    fn test_untouched_key_is_idle() {
        let store = StateStore::new();
        assert_eq!(store.get_state("never"), LifecycleState::Idle);
        assert!(store.is_in_state("never", LifecycleState::Idle));
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_state_is_last_write_wins() {
        let store = StateStore::new();
        store.set_state("k", LifecycleState::Success);
        store.set_state("k", LifecycleState::Pending);
        assert_eq!(store.get_state("k"), LifecycleState::Pending);
        assert!(!store.is_in_state("k", LifecycleState::Success));
    }

    #[test]
    fn test_subscribers_see_changes_only() {
        let store = StateStore::new();
        let seen = recorder(&store, "k");

        store.set_state("k", LifecycleState::Pending);
        store.set_state("k", LifecycleState::Pending);
        store.set_state("other", LifecycleState::Error);
        store.set_state("k", LifecycleState::Success);

        assert_eq!(
            *seen.lock(),
            vec![LifecycleState::Pending, LifecycleState::Success]
        );
    }

    #[test]
    fn test_subscribe_all_and_unsubscribe() {
        let store = StateStore::new();
        let keys = Arc::new(Mutex::new(Vec::new()));
        let sink = keys.clone();
        let id = store.subscribe_all(move |key, _, _| sink.lock().push(key.to_string()));

        store.set_state("a", LifecycleState::Pending);
        store.set_state("b", LifecycleState::Pending);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set_state("c", LifecycleState::Pending);

        assert_eq!(*keys.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_listener_may_write_store() {
        let store = Arc::new(StateStore::new());
        let inner = store.clone();
        store.subscribe("a", move |_, _, current| {
            inner.set_state("mirror", current);
        });

        store.set_state("a", LifecycleState::Error);
        assert_eq!(store.get_state("mirror"), LifecycleState::Error);
    }

    #[test]
    fn test_remove_resets_to_idle() {
        let store = StateStore::new();
        let seen = recorder(&store, "k");
        store.set_state("k", LifecycleState::Success);

        assert!(store.remove("k"));
        assert!(!store.remove("k"));
        assert_eq!(store.get_state("k"), LifecycleState::Idle);
        assert_eq!(
            *seen.lock(),
            vec![LifecycleState::Success, LifecycleState::Idle]
        );
    }

    #[test]
    fn test_concurrent_writes_notify_in_order() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe("k", move |_, previous, current| sink.lock().push((previous, current)));

        std::thread::scope(|scope| {
            for state in LifecycleState::ALL {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..500 {
                        store.set_state("k", state);
                    }
                });
            }
        });

        let seen = seen.lock();
        assert!(!seen.is_empty());
        assert_eq!(seen[0].0, LifecycleState::Idle);
        for pair in seen.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(seen.last().map(|(_, current)| *current), Some(store.get_state("k")));
    }

    #[test]
    fn test_promise_state_handle() {
        let store = Arc::new(StateStore::new());
        let handle = store.promise_state("user:1");

        assert_eq!(handle.state(), LifecycleState::Idle);
        handle.set(LifecycleState::Pending);
        assert!(handle.is_loading());
        assert!(handle.matches(LifecycleState::Pending));
        assert_eq!(store.get_state("user:1"), LifecycleState::Pending);
        assert_eq!(handle.key(), "user:1");
    }
}
