//! In-process transport.
//!
//! [`MemoryTransport`] records everything emitted through it and lets the
//! owner inject inbound events with [`trigger`](MemoryTransport::trigger).
//! It backs unit tests and benches. The emit record grows until it is
//! drained with [`take_emitted`](MemoryTransport::take_emitted), so
//! long-running loops must drain it on every iteration.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! manager.init(transport.clone());
//!
//! transport.trigger("connection:established", &json!({}));
//! transport.wait_for_emits(1).await;
//! let id = transport.last_request_id("models:list").unwrap();
//! transport.trigger("models:list:result", &json!({"requestId": id, "success": true}));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, RequestId};
use crate::protocol::request::REQUEST_ID_FIELD;

use super::registry::HandlerRegistry;
use super::{EventHandler, Transport};

// ============================================================================
// Emitted
// ============================================================================

/// One outbound message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    /// Event name.
    pub event: String,
    /// Payload.
    pub payload: Value,
}

impl Emitted {
    /// Returns the `requestId` carried by the payload, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.payload
            .get(REQUEST_ID_FIELD)
            .and_then(Value::as_str)
            .map(RequestId::from_wire)
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Loopback transport that records emits and dispatches injected events.
#[derive(Default)]
pub struct MemoryTransport {
    registry: HandlerRegistry,
    sent: Mutex<Vec<Emitted>>,
    sent_notify: Notify,
    closed: AtomicBool,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("sent", &self.sent.lock().len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Creates an open transport.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers an inbound event to registered handlers.
    ///
    /// Returns the number of handlers invoked.
    pub fn trigger(&self, event: &str, payload: &Value) -> usize {
        self.registry.dispatch(event, payload)
    }

    /// Returns a copy of every emitted message, oldest first.
    #[must_use]
    pub fn emitted(&self) -> Vec<Emitted> {
        self.sent.lock().clone()
    }

    /// Returns the payloads emitted under `event`.
    #[must_use]
    pub fn emitted_for(&self, event: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.event == event)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Returns the correlation id of the last request emitted under `event`.
    #[must_use]
    pub fn last_request_id(&self, event: &str) -> Option<RequestId> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.event == event)
            .and_then(Emitted::request_id)
    }

    /// Drains the record of emitted messages, leaving it empty.
    pub fn take_emitted(&self) -> Vec<Emitted> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Waits until at least `count` messages have been emitted.
    pub async fn wait_for_emits(&self, count: usize) {
        loop {
            let notified = self.sent_notify.notified();
            if self.sent.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Makes every later `emit` fail with [`Error::ConnectionClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.handler_count(event)
    }
}

impl Transport for MemoryTransport {
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.registry.add(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) {
        self.registry.remove(event, id);
    }

    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }

        trace!(event, "Memory transport emit");
        self.sent.lock().push(Emitted {
            event: event.to_string(),
            payload,
        });
        self.sent_notify.notify_waiters();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    #[test]
    fn test_emit_is_recorded() {
        let transport = MemoryTransport::new();
        transport
            .emit("models:list", json!({"requestId": "req_1"}))
            .expect("emit");

        assert_eq!(transport.emitted().len(), 1);
        assert_eq!(
            transport.last_request_id("models:list"),
            Some(RequestId::from_wire("req_1"))
        );
        assert!(transport.last_request_id("config:get").is_none());
    }

    #[test]
    fn test_trigger_reaches_handlers_until_off() {
        let transport = MemoryTransport::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = transport.on(
            "logs:entry",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        transport.trigger("logs:entry", &json!({}));
        transport.off("logs:entry", id);
        transport.trigger("logs:entry", &json!({}));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_transport_rejects_emit() {
        let transport = MemoryTransport::new();
        transport.close();

        let result = transport.emit("x", json!({}));
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_emits() {
        let transport = MemoryTransport::new();
        let emitter = Arc::clone(&transport);

        let task = tokio::spawn(async move {
            emitter.emit("a", json!({})).expect("emit");
            emitter.emit("b", json!({})).expect("emit");
        });

        transport.wait_for_emits(2).await;
        task.await.expect("task");
        assert_eq!(transport.take_emitted().len(), 2);
        assert!(transport.emitted().is_empty());
    }

    #[test]
    fn test_take_emitted_keeps_record_bounded() {
        let transport = MemoryTransport::new();

        for round in 0..3 {
            transport
                .emit("models:list", json!({"requestId": format!("req_{round}")}))
                .expect("emit");
            let drained = transport.take_emitted();
            assert_eq!(drained.len(), 1);
            assert_eq!(
                drained[0].request_id(),
                Some(RequestId::from_wire(format!("req_{round}")))
            );
        }

        assert!(transport.emitted().is_empty());
        assert!(transport.last_request_id("models:list").is_none());
    }
}
