//! Client core: correlation, routing and wiring.
//!
//! # Data Flow
//!
//! ```text
//! facade call ─► RequestCorrelator ─► Transport ─► server
//!                      ▲                              │
//!                PendingTable ◄── ResponseRouter ◄────┤ <event>:result
//!                                                     │
//!          StateStore ◄── BroadcastRouter ◄───────────┘ type: "broadcast"
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlator` | Pending table, deferred dispatch, per-request timers |
//! | `responses` | Result envelopes → pending requests |
//! | `broadcasts` | Broadcast envelopes → state mutations and hooks |
//! | `manager` | [`StateManager`], the public entry point |

// ============================================================================
// Submodules
// ============================================================================

/// Broadcast routing.
pub mod broadcasts;

/// Request correlation.
pub mod correlator;

/// Component wiring.
pub mod manager;

/// Response routing.
pub mod responses;

// ============================================================================
// Re-exports
// ============================================================================

pub use broadcasts::{BroadcastHook, BroadcastHooks, BroadcastRouter};
pub use correlator::{PendingTable, RequestCorrelator};
pub use manager::StateManager;
pub use responses::ResponseRouter;
