//! Duplex event transport.
//!
//! The client core talks to the backend through the [`Transport`] trait:
//! named events carrying JSON payloads in both directions, plus the
//! lifecycle events in [`events`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  StateManager    │                              │  llama proxy    │
//! │                  │     WebSocket (Socket.IO)    │  server         │
//! │  Transport ──────│◄────────────────────────────►│                 │
//! │  Lifecycle       │   /llamaproxws/?EIO=4        │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. Transport opens and emits local `connect`
//! 2. [`ConnectionLifecycle`] answers with `connection:ack`
//! 3. Server replies `connection:established`, state becomes connected
//! 4. If step 3 never happens, the fallback timer promotes the state
//! 5. `disconnect` returns the state to disconnected
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Event → handler table shared by transports |
//! | `memory` | In-process transport |
//! | `packet` | Engine.IO / Socket.IO text packet codec |
//! | `socketio` | WebSocket transport speaking Socket.IO |
//! | `lifecycle` | Connected/disconnected tracking with fallback |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::HandlerId;

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle tracking.
pub mod lifecycle;

/// In-process transport.
pub mod memory;

/// Engine.IO / Socket.IO packet codec.
pub mod packet;

/// Event handler registry.
pub mod registry;

/// WebSocket transport.
pub mod socketio;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle event names.
pub mod events {
    /// Transport opened.
    pub const CONNECT: &str = "connect";
    /// Transport closed.
    pub const DISCONNECT: &str = "disconnect";
    /// Client acknowledgment sent after `connect`.
    pub const ACK: &str = "connection:ack";
    /// Server readiness acknowledgment.
    pub const ESTABLISHED: &str = "connection:established";
}

// ============================================================================
// Transport
// ============================================================================

/// Event handler callback.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// A persistent duplex event connection.
///
/// Implementations must be callable from any task and must not block in
/// `emit`. Handlers run on whatever task receives the inbound event.
pub trait Transport: Send + Sync {
    /// Registers `handler` for `event` and returns a removal token.
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Removes the registration identified by `id`. Unknown ids are ignored.
    fn off(&self, event: &str, id: HandlerId);

    /// Sends `payload` under `event`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the transport has shut down.
    fn emit(&self, event: &str, payload: Value) -> Result<()>;
}

// ============================================================================
// Registration
// ============================================================================

/// A handler registered on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    event: String,
    id: HandlerId,
}

impl Registration {
    /// Registers `handler` on `transport` and records the token.
    pub fn add(transport: &dyn Transport, event: &str, handler: EventHandler) -> Self {
        let id = transport.on(event, handler);
        Self {
            event: event.to_string(),
            id,
        }
    }

    /// Removes the handler from `transport`.
    pub fn remove(&self, transport: &dyn Transport) {
        transport.off(&self.event, self.id);
    }

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

// ============================================================================
// Re-exports
// ============================================================================

pub use lifecycle::ConnectionLifecycle;
pub use memory::{Emitted, MemoryTransport};
pub use registry::HandlerRegistry;
pub use socketio::{SocketIoOptions, SocketIoTransport};
