//! Request/response correlation over an event transport.
//!
//! Each request gets a fresh [`RequestId`], an entry in the
//! [`PendingTable`], and a timer task. The entry is removed exactly once:
//! by the matching response ([`PendingTable::settle`]) or by its timer.
//!
//! Requests issued while disconnected wait for the connected flag before
//! they are emitted at all.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::RequestEnvelope;
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// Channel that settles one caller.
type Settle = oneshot::Sender<Result<Value>>;

/// A dispatched request awaiting its response.
struct PendingRequest {
    sender: Settle,
    timer: AbortHandle,
    event: String,
    dispatched_at: Instant,
}

// ============================================================================
// PendingTable
// ============================================================================

/// Correlation id → pending request.
///
/// Shared between the correlator, which inserts, and the response router,
/// which settles. Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct PendingTable {
    inner: Arc<Mutex<FxHashMap<RequestId, PendingRequest>>>,
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingTable {
    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns `true` if `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Settles the request `id` with `outcome`.
    ///
    /// Cancels its timer and removes it. Returns `false` for unknown or
    /// already settled ids, which are left untouched.
    pub fn settle(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        let Some(pending) = self.inner.lock().remove(id) else {
            return false;
        };

        pending.timer.abort();
        debug!(
            request_id = %id,
            event = %pending.event,
            ok = outcome.is_ok(),
            elapsed_ms = pending.dispatched_at.elapsed().as_millis() as u64,
            "Request settled"
        );

        // The caller may have stopped waiting.
        let _ = pending.sender.send(outcome);
        true
    }

    /// Fails every pending request with the error built by `make_error`.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<PendingRequest> = self.inner.lock().drain().map(|(_, p)| p).collect();
        let count = drained.len();

        for pending in drained {
            pending.timer.abort();
            let _ = pending.sender.send(Err(make_error()));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Removes `id` without settling it.
    fn discard(&self, id: &RequestId) {
        if let Some(pending) = self.inner.lock().remove(id) {
            pending.timer.abort();
        }
    }

    /// Times out `id` if it is still pending.
    fn expire(&self, id: &RequestId, after: Duration) {
        let Some(pending) = self.inner.lock().remove(id) else {
            return;
        };

        let timeout_ms = after.as_millis() as u64;
        warn!(request_id = %id, event = %pending.event, timeout_ms, "Request timed out");

        let _ = pending
            .sender
            .send(Err(Error::request_timeout(pending.event, id.clone(), timeout_ms)));
    }
}

// ============================================================================
// RequestCorrelator
// ============================================================================

/// Issues correlated requests and waits for their outcome.
pub struct RequestCorrelator {
    config: Arc<ClientConfig>,
    connected: watch::Receiver<bool>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    pending: PendingTable,
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("connected", &*self.connected.borrow())
            .field("attached", &self.transport.read().is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RequestCorrelator {
    /// Creates a correlator observing `connected`.
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, connected: watch::Receiver<bool>) -> Self {
        Self {
            config,
            connected,
            transport: RwLock::new(None),
            pending: PendingTable::default(),
        }
    }

    /// Sets the transport requests are emitted on.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    /// Releases the transport. Later dispatches fail.
    pub fn detach(&self) -> Option<Arc<dyn Transport>> {
        self.transport.write().take()
    }

    /// Returns the pending table.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Returns the current connected flag.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Sends `payload` under `event` and waits for the matching response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if not connected within the connect wait
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::RequestFailed`] if the backend reports failure
    /// - [`Error::ConnectionClosed`] if the transport is gone
    pub async fn request(&self, event: &str, payload: Value) -> Result<Value> {
        self.wait_connected(event).await?;
        let rx = self.dispatch(event, payload)?;
        rx.await?
    }

    /// Waits for the connected flag, up to the configured connect wait.
    async fn wait_connected(&self, event: &str) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        debug!(event, "Not connected, deferring request");

        let wait = self.config.connect_wait;
        let mut connected = self.connected.clone();

        match timeout(wait, connected.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => {
                trace!(event, "Connected, releasing deferred request");
                Ok(())
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                warn!(event, wait_ms = wait.as_millis() as u64, "Connection wait elapsed");
                Err(Error::connection_timeout(wait.as_millis() as u64))
            }
        }
    }

    /// Registers the request and emits it.
    fn dispatch(&self, event: &str, payload: Value) -> Result<oneshot::Receiver<Result<Value>>> {
        let transport = self
            .transport
            .read()
            .clone()
            .ok_or_else(|| Error::connection("no transport attached"))?;

        let after = self.config.timeout_for(event);
        let (sender, receiver) = oneshot::channel();

        let request_id = {
            let mut table = self.pending.inner.lock();

            let mut request_id = RequestId::generate();
            while table.contains_key(&request_id) {
                request_id = RequestId::generate();
            }

            let pending = self.pending.clone();
            let expiring = request_id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(after).await;
                pending.expire(&expiring, after);
            })
            .abort_handle();

            table.insert(
                request_id.clone(),
                PendingRequest {
                    sender,
                    timer,
                    event: event.to_string(),
                    dispatched_at: Instant::now(),
                },
            );
            request_id
        };

        let envelope = RequestEnvelope::new(event, payload, request_id.clone());
        if let Err(e) = transport.emit(event, envelope.to_wire()) {
            self.pending.discard(&request_id);
            return Err(e);
        }

        debug!(
            request_id = %request_id,
            event,
            timeout_ms = after.as_millis() as u64,
            "Request dispatched"
        );
        Ok(receiver)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok};

    use crate::transport::MemoryTransport;

    fn correlator(connected: bool) -> (Arc<RequestCorrelator>, watch::Sender<bool>, Arc<MemoryTransport>) {
        let (tx, rx) = watch::channel(connected);
        let correlator = Arc::new(RequestCorrelator::new(Arc::new(ClientConfig::default()), rx));
        let transport = MemoryTransport::new();
        correlator.attach(transport.clone());
        (correlator, tx, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_resolves_caller() {
        let (correlator, _tx, transport) = correlator(true);

        let caller = Arc::clone(&correlator);
        let task = tokio::spawn(async move { caller.request("models:list", json!({})).await });

        transport.wait_for_emits(1).await;
        let id = transport.last_request_id("models:list").expect("request id");
        assert!(correlator.pending().contains(&id));

        assert!(correlator.pending().settle(&id, Ok(json!({"models": []}))));
        assert!(!correlator.pending().settle(&id, Ok(json!({}))));

        let value = task.await.expect("join").expect("response");
        assert_eq!(value, json!({"models": []}));
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_spread_with_request_id() {
        let (correlator, _tx, transport) = correlator(true);

        let caller = Arc::clone(&correlator);
        tokio::spawn(async move { caller.request("models:get", json!({"modelId": "m1"})).await });

        transport.wait_for_emits(1).await;
        let payload = &transport.emitted_for("models:get")[0];
        assert_eq!(payload["modelId"], "m1");
        assert!(payload["requestId"].as_str().is_some_and(|id| id.starts_with("req_")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_namespace_times_out() {
        let (correlator, _tx, _transport) = correlator(true);

        let mut fut = tokio_test::task::spawn(correlator.request("config:get", json!({})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let err = assert_ready_err!(fut.poll());
        assert_eq!(err.to_string(), "Timeout: config:get after 5000ms");
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_namespace_waits_longer() {
        let (correlator, _tx, transport) = correlator(true);

        let mut fut = tokio_test::task::spawn(correlator.request("models:list", json!({})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(119_000)).await;
        assert_pending!(fut.poll());

        let id = transport.last_request_id("models:list").expect("request id");
        correlator.pending().settle(&id, Ok(json!({"ok": true})));

        let value = assert_ready_ok!(fut.poll());
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_namespace_times_out() {
        let (correlator, _tx, _transport) = correlator(true);

        let mut fut = tokio_test::task::spawn(correlator.request("models:list", json!({})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(119_999)).await;
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let err = assert_ready_err!(fut.poll());
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout: models:list after 120000ms");
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_until_connected() {
        let (correlator, tx, transport) = correlator(false);

        let mut fut = tokio_test::task::spawn(correlator.request("config:update", json!({"a": 1})));
        assert_pending!(fut.poll());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.emitted().is_empty());

        tx.send_replace(true);
        assert_pending!(fut.poll());
        assert_eq!(transport.emitted_for("config:update").len(), 1);

        let id = transport.last_request_id("config:update").expect("request id");
        correlator.pending().settle(&id, Ok(json!({"saved": true})));
        assert_eq!(assert_ready_ok!(fut.poll()), json!({"saved": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_never_emits() {
        let (correlator, _tx, transport) = correlator(false);

        let err = correlator
            .request("models:list", json!({}))
            .await
            .expect_err("should time out");

        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 10_000 }));
        assert_eq!(err.to_string(), "Connection timeout");
        assert!(transport.emitted().is_empty());
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_failure_cleans_up() {
        let (correlator, _tx, transport) = correlator(true);
        transport.close();

        let err = correlator
            .request("models:list", json!({}))
            .await
            .expect_err("emit fails");

        assert!(matches!(err, Error::ConnectionClosed));
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_all() {
        let (correlator, _tx, transport) = correlator(true);

        let mut first = tokio_test::task::spawn(correlator.request("models:list", json!({})));
        let mut second = tokio_test::task::spawn(correlator.request("logs:get", json!({})));
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(transport.emitted().len(), 2);

        assert_eq!(correlator.pending().fail_all(|| Error::ConnectionClosed), 2);
        assert!(matches!(assert_ready_err!(first.poll()), Error::ConnectionClosed));
        assert!(matches!(assert_ready_err!(second.poll()), Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_detached_request_fails() {
        let (correlator, _tx, _transport) = correlator(true);
        assert!(correlator.detach().is_some());

        let err = correlator
            .request("models:list", json!({}))
            .await
            .expect_err("no transport");
        assert!(err.is_connection_error());
    }
}
