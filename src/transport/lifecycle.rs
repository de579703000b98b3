//! Connected/disconnected tracking for one transport.
//!
//! The server signals readiness with `connection:established` after the
//! client acknowledges `connect`. Some servers never send it, so
//! [`setup`](ConnectionLifecycle::setup) also arms a one-shot fallback
//! timer that promotes the state to connected after a grace period.
//!
//! # States
//!
//! ```text
//!            established / fallback
//! disconnected ───────────────────────► connected
//!      ▲                                    │
//!      └──────────── disconnect ────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::config::DEFAULT_FALLBACK_DELAY;

use super::{Registration, Transport, events};

// ============================================================================
// Types
// ============================================================================

/// Transition callback.
pub type TransitionCallback = Arc<dyn Fn() + Send + Sync>;

/// The transport currently observed and its handler tokens.
struct Attached {
    transport: Arc<dyn Transport>,
    registrations: Vec<Registration>,
}

struct LifecycleInner {
    connected: watch::Sender<bool>,
    fallback_delay: Duration,
    fallback: Mutex<Option<AbortHandle>>,
    on_connected: Mutex<Option<TransitionCallback>>,
    on_disconnected: Mutex<Option<TransitionCallback>>,
    attached: Mutex<Option<Attached>>,
}

// ============================================================================
// ConnectionLifecycle
// ============================================================================

/// Connection state machine with an auto-promote fallback.
///
/// Cheap to clone; clones share state. Transport handlers hold weak
/// references, so dropping every clone stops the lifecycle.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    inner: Arc<LifecycleInner>,
}

impl fmt::Debug for ConnectionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("connected", &self.is_connected())
            .field("fallback_delay", &self.inner.fallback_delay)
            .field("fallback_armed", &self.inner.fallback.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_DELAY)
    }
}

impl ConnectionLifecycle {
    /// Creates a disconnected lifecycle.
    #[must_use]
    pub fn new(fallback_delay: Duration) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(LifecycleInner {
                connected,
                fallback_delay,
                fallback: Mutex::new(None),
                on_connected: Mutex::new(None),
                on_disconnected: Mutex::new(None),
                attached: Mutex::new(None),
            }),
        }
    }

    /// Sets the callback run on every transition to connected.
    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_connected.lock() = Some(Arc::new(callback));
    }

    /// Sets the callback run on every transition to disconnected.
    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_disconnected.lock() = Some(Arc::new(callback));
    }

    /// Starts observing `transport`.
    ///
    /// Registers the `connect`, `disconnect` and `connection:established`
    /// handlers and arms the fallback timer. A previously observed
    /// transport is released first. Must be called inside a Tokio runtime.
    pub fn setup(&self, transport: Arc<dyn Transport>) {
        self.release();

        let weak = Arc::downgrade(&self.inner);
        let ack_transport = Arc::downgrade(&transport);
        let mut registrations = Vec::with_capacity(3);

        registrations.push(Registration::add(
            transport.as_ref(),
            events::CONNECT,
            Arc::new(move |_: &Value| {
                let Some(transport) = ack_transport.upgrade() else {
                    return;
                };
                debug!("Transport connected, sending acknowledgment");
                if let Err(e) = transport.emit(events::ACK, json!({})) {
                    warn!(error = %e, "Failed to send connection acknowledgment");
                }
            }),
        ));

        let on_established = weak.clone();
        registrations.push(Registration::add(
            transport.as_ref(),
            events::ESTABLISHED,
            Arc::new(move |_: &Value| {
                if let Some(inner) = on_established.upgrade() {
                    debug!("Connection established");
                    inner.mark_connected();
                }
            }),
        ));

        let on_disconnect = weak.clone();
        registrations.push(Registration::add(
            transport.as_ref(),
            events::DISCONNECT,
            Arc::new(move |_: &Value| {
                if let Some(inner) = on_disconnect.upgrade() {
                    debug!("Transport disconnected");
                    inner.mark_disconnected();
                }
            }),
        ));

        *self.inner.attached.lock() = Some(Attached {
            transport,
            registrations,
        });

        if !self.is_connected() {
            self.arm_fallback(weak);
        }
    }

    /// Cancels the fallback timer and releases the transport.
    ///
    /// Safe to call repeatedly and before [`setup`](Self::setup).
    pub fn destroy(&self) {
        self.release();
        debug!("Connection lifecycle destroyed");
    }

    /// Returns the current connected flag.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Returns a receiver that observes every change of the connected flag.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    /// Returns `true` while the fallback timer is pending.
    #[must_use]
    pub fn fallback_armed(&self) -> bool {
        self.inner.fallback.lock().is_some()
    }

    fn arm_fallback(&self, weak: Weak<LifecycleInner>) {
        let delay = self.inner.fallback_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_fallback(delay);
            }
        });

        let previous = self.inner.fallback.lock().replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn release(&self) {
        self.inner.cancel_fallback();

        let attached = self.inner.attached.lock().take();
        if let Some(attached) = attached {
            for registration in &attached.registrations {
                registration.remove(attached.transport.as_ref());
            }
        }
    }
}

impl LifecycleInner {
    fn cancel_fallback(&self) {
        if let Some(handle) = self.fallback.lock().take() {
            handle.abort();
        }
    }

    fn mark_connected(&self) {
        self.cancel_fallback();
        self.connected.send_replace(true);

        let callback = self.on_connected.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn mark_disconnected(&self) {
        self.connected.send_replace(false);

        let callback = self.on_disconnected.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn fire_fallback(&self, delay: Duration) {
        if self.fallback.lock().take().is_none() {
            return;
        }
        if *self.connected.borrow() {
            return;
        }

        warn!(
            delay_ms = delay.as_millis() as u64,
            "No connection:established received, assuming connected"
        );
        self.mark_connected();
    }
}

// ============================================================================
// Tests
// ============================================================================
