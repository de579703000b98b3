//! Subscribable state snapshot.
//!
//! The store holds named JSON values. Every write goes through
//! [`StateStore::set`], which compares old and new values structurally and
//! notifies subscribers synchronously only when something changed.
//!
//! # Notification Order
//!
//! For a single `set`, key subscribers run first, then wildcard
//! subscribers, each group in registration order. All of them run before
//! `set` returns and observe the snapshot as it is after the write.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::SubscriptionId;

use super::equality::structural_eq;

// ============================================================================
// Constants
// ============================================================================

/// Reserved key that subscribes to every write.
pub const WILDCARD: &str = "*";

// ============================================================================
// Types
// ============================================================================

/// Immutable copy of the store contents.
pub type StateSnapshot = FxHashMap<String, Value>;

/// Subscriber callback.
pub type Listener = Arc<dyn Fn(&StateChange<'_>) + Send + Sync>;

/// One registered listener.
struct ListenerEntry {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    callback: Listener,
}

impl Clone for ListenerEntry {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

// ============================================================================
// StateChange
// ============================================================================

/// A change delivered to subscribers.
///
/// Wildcard subscribers use `key` to tell which entry changed; key
/// subscribers can ignore it.
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    /// Key that was written.
    pub key: &'a str,
    /// Value after the write.
    pub value: &'a Value,
    /// Value before the write, `None` if the key was never set.
    pub old: Option<&'a Value>,
    /// Full snapshot after the write.
    pub snapshot: &'a StateSnapshot,
}

// ============================================================================
// StateStore
// ============================================================================

/// Shared state snapshot with per-key and wildcard subscriptions.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<StateSnapshot>,
    listeners: Mutex<FxHashMap<String, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.inner.state.read().keys().cloned().collect();
        f.debug_struct("StateStore")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the whole snapshot.
    #[must_use]
    pub fn get_state(&self) -> StateSnapshot {
        self.inner.state.read().clone()
    }

    /// Returns the value under `key`, or `None` if it was never set.
    ///
    /// A stored `null`, `0`, `false` or `""` is returned as `Some`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.read().get(key).cloned()
    }

    /// Returns `true` if `key` has ever been set.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.read().contains_key(key)
    }

    /// Writes `value` under `key`.
    ///
    /// The value is always replaced. Subscribers are notified only when the
    /// key was unset or the old value is not structurally equal to the new
    /// one. Returns `self` for chaining.
    pub fn set(&self, key: impl Into<String>, value: Value) -> &Self {
        let key = key.into();

        let (old, snapshot) = {
            let mut state = self.inner.state.write();
            let old = state.insert(key.clone(), value.clone());
            if old.as_ref().is_some_and(|old| structural_eq(old, &value)) {
                trace!(key = %key, "State unchanged, notification suppressed");
                return self;
            }
            (old, state.clone())
        };

        self.notify(&key, &value, old.as_ref(), &snapshot);
        self
    }

    /// Registers `callback` for writes to `key`.
    ///
    /// Use [`WILDCARD`] to observe every write. Each call creates a distinct
    /// registration, removed only by the returned [`Subscription`].
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&StateChange<'_>) + Send + Sync + 'static,
    {
        let key = key.into();
        let id = SubscriptionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));

        self.inner
            .listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .push(ListenerEntry {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });

        trace!(key = %key, %id, "Subscribed");

        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            active,
        }
    }

    /// Returns the number of active registrations for `key`.
    #[must_use]
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Invokes key subscribers, then wildcard subscribers.
    fn notify(&self, key: &str, value: &Value, old: Option<&Value>, snapshot: &StateSnapshot) {
        let targets: Vec<ListenerEntry> = {
            let listeners = self.inner.listeners.lock();
            let keyed = listeners.get(key).into_iter().flatten();
            let wildcard = if key == WILDCARD {
                None
            } else {
                listeners.get(WILDCARD)
            };
            keyed.chain(wildcard.into_iter().flatten()).cloned().collect()
        };

        if targets.is_empty() {
            return;
        }

        let change = StateChange {
            key,
            value,
            old,
            snapshot,
        };

        for entry in targets {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(&change);
            }
        }
    }
}

impl StoreInner {
    fn remove_listener(&self, key: &str, id: SubscriptionId) {
        if let Some(entries) = self.listeners.lock().get_mut(key) {
            entries.retain(|entry| entry.id != id);
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle returned by [`StateStore::subscribe`].
///
/// Dropping the handle leaves the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    store: Weak<StoreInner>,
    key: String,
    id: SubscriptionId,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Removes this registration. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(&self.key, self.id);
        }
        trace!(key = %self.key, id = %self.id, "Unsubscribed");
    }

    /// Returns `true` until [`unsubscribe`](Self::unsubscribe) is called.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the subscribed key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the registration id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

// ============================================================================
// Tests
// ============================================================================
