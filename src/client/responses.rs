//! Routes `<event>:result` envelopes to pending requests.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::{RESULT_EVENTS, ResponseEnvelope, result_event};
use crate::transport::{Registration, Transport};

use super::correlator::PendingTable;

// ============================================================================
// ResponseRouter
// ============================================================================

struct Attached {
    transport: Arc<dyn Transport>,
    registrations: Vec<Registration>,
    events: FxHashSet<String>,
}

/// Settles pending requests from response envelopes.
///
/// Every name in [`RESULT_EVENTS`] is registered on attach. Result events
/// for other request names are registered on first use through
/// [`ensure`](Self::ensure).
pub struct ResponseRouter {
    pending: PendingTable,
    attached: Mutex<Option<Attached>>,
}

impl fmt::Debug for ResponseRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.attached.lock().as_ref().map_or(0, |a| a.events.len());
        f.debug_struct("ResponseRouter")
            .field("pending", &self.pending.len())
            .field("events", &events)
            .finish()
    }
}

impl ResponseRouter {
    /// Creates a router settling entries of `pending`.
    #[must_use]
    pub fn new(pending: PendingTable) -> Self {
        Self {
            pending,
            attached: Mutex::new(None),
        }
    }

    /// Registers the result handlers on `transport`.
    ///
    /// A previously attached transport is released first.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        self.detach();

        let mut attached = Attached {
            transport,
            registrations: Vec::with_capacity(RESULT_EVENTS.len()),
            events: FxHashSet::default(),
        };
        for event in RESULT_EVENTS {
            self.register(&mut attached, event);
        }

        debug!(events = attached.events.len(), "Response router attached");
        *self.attached.lock() = Some(attached);
    }

    /// Makes sure the result event for request `event` is routed.
    pub fn ensure(&self, event: &str) {
        let name = result_event(event);
        let mut guard = self.attached.lock();
        let Some(attached) = guard.as_mut() else {
            return;
        };
        if attached.events.contains(&name) {
            return;
        }

        trace!(event = %name, "Registering result event");
        self.register(attached, &name);
    }

    /// Removes every handler from the attached transport.
    pub fn detach(&self) {
        let attached = self.attached.lock().take();
        if let Some(attached) = attached {
            for registration in &attached.registrations {
                registration.remove(attached.transport.as_ref());
            }
        }
    }

    /// Settles the pending request addressed by `payload`.
    ///
    /// Returns `false` when the payload is not a response, carries no
    /// `requestId`, or addresses nothing pending.
    pub fn route(&self, payload: &Value) -> bool {
        route_response(&self.pending, payload)
    }

    fn register(&self, attached: &mut Attached, name: &str) {
        let pending = self.pending.clone();
        let registration = Registration::add(
            attached.transport.as_ref(),
            name,
            Arc::new(move |payload: &Value| {
                route_response(&pending, payload);
            }),
        );
        attached.registrations.push(registration);
        attached.events.insert(name.to_string());
    }
}

fn route_response(pending: &PendingTable, payload: &Value) -> bool {
    let Some(envelope) = ResponseEnvelope::from_value(payload) else {
        trace!("Ignoring payload that is not a response envelope");
        return false;
    };
    let Some(request_id) = envelope.request_id.clone() else {
        trace!("Ignoring response without requestId");
        return false;
    };

    if !pending.settle(&request_id, envelope.into_result()) {
        warn!(request_id = %request_id, "Response for unknown request");
        return false;
    }
    true
}

// ============================================================================
// Tests
// ============================================================================
