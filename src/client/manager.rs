//! Wiring of store, lifecycle, correlator and routers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::facade::{ModelOps, ServiceOps};
use crate::protocol::{BroadcastChannel, Command};
use crate::state::{StateChange, StateSnapshot, StateStore, Subscription, keys};
use crate::transport::{ConnectionLifecycle, Transport};

use super::broadcasts::BroadcastRouter;
use super::correlator::RequestCorrelator;
use super::responses::ResponseRouter;

// ============================================================================
// Constants
// ============================================================================

/// `connectionStatus` value while connected.
pub const STATUS_CONNECTED: &str = "connected";

/// `connectionStatus` value while disconnected.
pub const STATUS_DISCONNECTED: &str = "disconnected";

// ============================================================================
// StateManager
// ============================================================================

struct ManagerInner {
    config: Arc<ClientConfig>,
    store: StateStore,
    lifecycle: ConnectionLifecycle,
    correlator: RequestCorrelator,
    responses: ResponseRouter,
    broadcasts: BroadcastRouter,
}

/// Client core for the dashboard.
///
/// Owns the state store and turns a [`Transport`] into correlated
/// requests and state updates. Cheap to clone; clones share everything.
///
/// # Example
///
/// ```ignore
/// let manager = StateManager::new(ClientConfig::default());
/// manager.init(SocketIoTransport::connect(&options).await?);
///
/// let sub = manager.subscribe("models", |change| println!("{}", change.value));
/// let models = manager.models().list().await?;
/// ```
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl StateManager {
    /// Creates a manager with an empty store and no transport.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let config = Arc::new(config);
        let store = StateStore::new();
        let lifecycle = ConnectionLifecycle::new(config.fallback_delay);

        let status = store.clone();
        lifecycle.on_connected(move || {
            status.set(keys::CONNECTION_STATUS, json!(STATUS_CONNECTED));
        });
        let status = store.clone();
        lifecycle.on_disconnected(move || {
            status.set(keys::CONNECTION_STATUS, json!(STATUS_DISCONNECTED));
        });

        let correlator = RequestCorrelator::new(Arc::clone(&config), lifecycle.watch());
        let responses = ResponseRouter::new(correlator.pending().clone());
        let broadcasts =
            BroadcastRouter::new(store.clone(), config.metrics_history_cap, config.log_cap);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                store,
                lifecycle,
                correlator,
                responses,
                broadcasts,
            }),
        }
    }

    /// Attaches `transport` and starts tracking its connection.
    ///
    /// Must be called inside a Tokio runtime. Calling it again replaces
    /// the previous transport.
    pub fn init(&self, transport: Arc<dyn Transport>) {
        let inner = &self.inner;

        inner.responses.attach(Arc::clone(&transport));
        inner.broadcasts.attach(Arc::clone(&transport));
        inner.correlator.attach(Arc::clone(&transport));
        inner.lifecycle.setup(transport);

        debug!("State manager initialized");
    }

    /// Sends `payload` under `event` and waits for the response `data`.
    ///
    /// # Errors
    ///
    /// See [`RequestCorrelator::request`].
    pub async fn request(&self, event: &str, payload: Value) -> Result<Value> {
        self.inner.responses.ensure(event);
        self.inner.correlator.request(event, payload).await
    }

    /// Sends a catalogued command.
    ///
    /// # Errors
    ///
    /// See [`RequestCorrelator::request`].
    pub async fn send(&self, command: impl Into<Command>) -> Result<Value> {
        let (event, payload) = command.into().into_parts()?;
        self.request(&event, payload).await
    }

    /// Returns the state store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Returns a copy of the whole snapshot.
    #[must_use]
    pub fn get_state(&self) -> StateSnapshot {
        self.inner.store.get_state()
    }

    /// Returns the value under `key`, or `None` if it was never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.store.get(key)
    }

    /// Writes `value` under `key`. Returns `self` for chaining.
    pub fn set(&self, key: impl Into<String>, value: Value) -> &Self {
        self.inner.store.set(key, value);
        self
    }

    /// Registers `callback` for writes to `key` (or the wildcard).
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&StateChange<'_>) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(key, callback)
    }

    /// Adds a side-effect hook for broadcasts on `channel`.
    pub fn on_broadcast<F>(&self, channel: BroadcastChannel, hook: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.broadcasts.hooks().on(channel, hook);
    }

    /// Returns the current connected flag.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lifecycle.is_connected()
    }

    /// Returns the number of dispatched requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending().len()
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the model operations facade.
    #[inline]
    #[must_use]
    pub fn models(&self) -> ModelOps<'_> {
        ModelOps::new(self)
    }

    /// Returns the router, metrics, logs, config and settings facade.
    #[inline]
    #[must_use]
    pub fn service(&self) -> ServiceOps<'_> {
        ServiceOps::new(self)
    }

    /// Detaches from the transport and fails every pending request.
    ///
    /// The store keeps its contents.
    pub fn shutdown(&self) {
        let inner = &self.inner;

        inner.lifecycle.destroy();
        inner.responses.detach();
        inner.broadcasts.detach();
        inner.correlator.detach();

        let failed = inner.correlator.pending().fail_all(|| Error::ConnectionClosed);
        debug!(failed, "State manager shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok};

    use crate::protocol::ModelsCommand;
    use crate::transport::{MemoryTransport, events};

    fn connected_manager() -> (StateManager, Arc<MemoryTransport>) {
        let manager = StateManager::default();
        let transport = MemoryTransport::new();
        manager.init(transport.clone());
        transport.trigger(events::ESTABLISHED, &json!({}));
        (manager, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_status_tracks_lifecycle() {
        let manager = StateManager::default();
        let transport = MemoryTransport::new();
        manager.init(transport.clone());
        assert!(manager.get(keys::CONNECTION_STATUS).is_none());

        transport.trigger(events::ESTABLISHED, &json!({}));
        assert!(manager.is_connected());
        assert_eq!(manager.get(keys::CONNECTION_STATUS), Some(json!("connected")));

        transport.trigger(events::DISCONNECT, &json!(null));
        assert!(!manager.is_connected());
        assert_eq!(manager.get(keys::CONNECTION_STATUS), Some(json!("disconnected")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_request_dispatches_after_establishment() {
        let manager = StateManager::default();
        let transport = MemoryTransport::new();
        manager.init(transport.clone());

        let mut fut = tokio_test::task::spawn(manager.request("config:update", json!({"config": {}})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.emitted_for("config:update").is_empty());

        transport.trigger(events::ESTABLISHED, &json!({}));
        assert_pending!(fut.poll());
        let id = transport.last_request_id("config:update").expect("emitted");

        transport.trigger(
            "config:update:result",
            &json!({"requestId": id, "success": true, "data": {"saved": true}}),
        );
        assert_eq!(assert_ready_ok!(fut.poll()), json!({"saved": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_releases_deferred_request() {
        let manager = StateManager::default();
        let transport = MemoryTransport::new();
        manager.init(transport.clone());

        let mut fut = tokio_test::task::spawn(manager.request("models:list", json!({})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert!(manager.is_connected());
        assert_pending!(fut.poll());
        assert_eq!(transport.emitted_for("models:list").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_command_round_trip() {
        let (manager, transport) = connected_manager();

        let mut fut = tokio_test::task::spawn(manager.send(ModelsCommand::Get {
            model_id: "m1".into(),
        }));
        assert_pending!(fut.poll());

        let emitted = transport.emitted_for("models:get");
        assert_eq!(emitted[0]["modelId"], "m1");

        let id = transport.last_request_id("models:get").expect("emitted");
        transport.trigger(
            "models:get:result",
            &json!({"requestId": id, "success": false, "error": {"message": "Model not found"}}),
        );
        let err = assert_ready_err!(fut.poll());
        assert_eq!(err.to_string(), "Model not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncatalogued_event_is_routed() {
        let (manager, transport) = connected_manager();

        let mut fut = tokio_test::task::spawn(manager.request("presets:list", json!({})));
        assert_pending!(fut.poll());

        let id = transport.last_request_id("presets:list").expect("emitted");
        transport.trigger(
            "presets:list:result",
            &json!({"requestId": id, "success": true, "data": ["a"]}),
        );
        assert_eq!(assert_ready_ok!(fut.poll()), json!(["a"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcasts_reach_store_and_hooks() {
        let (manager, transport) = connected_manager();
        let scans = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&scans);
        manager.on_broadcast(BroadcastChannel::ModelsScanned, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sub = manager.subscribe(keys::MODELS, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let list = json!({"type": "broadcast", "data": {"models": [{"id": "a"}]}});
        transport.trigger("models:list", &list);
        transport.trigger("models:list", &list);
        transport.trigger("models:scanned", &json!({"type": "broadcast"}));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(scans.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_pending_and_detaches() {
        let (manager, transport) = connected_manager();

        let mut fut = tokio_test::task::spawn(manager.request("models:list", json!({})));
        assert_pending!(fut.poll());
        assert_eq!(manager.pending_count(), 1);

        manager.shutdown();
        manager.shutdown();

        assert!(matches!(assert_ready_err!(fut.poll()), Error::ConnectionClosed));
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(transport.handler_count("models:list:result"), 0);
        assert_eq!(transport.handler_count("models:list"), 0);
        assert_eq!(transport.handler_count(events::ESTABLISHED), 0);
    }

    #[tokio::test]
    async fn test_set_chains_and_notifies() {
        let manager = StateManager::default();
        manager.set("a", json!(1)).set("b", json!(2));

        let state = manager.get_state();
        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("b"), Some(&json!(2)));
    }
}
