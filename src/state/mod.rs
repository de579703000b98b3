//! Reactive client state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `store` | [`StateStore`] with per-key and wildcard subscriptions |
//! | `equality` | Structural equality used for change suppression |
//! | `bounded` | Capped buffers for metrics history and the log tail |
//!
//! # Well-known Keys
//!
//! The routers and facades write the keys in [`keys`]. Any other key is
//! free for application use.

// ============================================================================
// Submodules
// ============================================================================

/// Capped JSON array buffers.
pub mod bounded;

/// Structural equality over JSON values.
pub mod equality;

/// State store and subscriptions.
pub mod store;

// ============================================================================
// Keys
// ============================================================================

/// State keys written by the client core.
pub mod keys {
    /// Array of model records.
    pub const MODELS: &str = "models";
    /// Latest metrics sample.
    pub const METRICS: &str = "metrics";
    /// Capped array of metric samples, oldest first.
    pub const METRICS_HISTORY: &str = "metricsHistory";
    /// Capped array of log entries, newest first.
    pub const LOGS: &str = "logs";
    /// `"connected"` or `"disconnected"`.
    pub const CONNECTION_STATUS: &str = "connectionStatus";
    /// Router process status, `null` once the router stopped.
    pub const ROUTER_STATUS: &str = "routerStatus";
    /// Last `llama:status` broadcast payload.
    pub const LLAMA_SERVER_STATUS: &str = "llamaServerStatus";
}

// ============================================================================
// Re-exports
// ============================================================================

pub use equality::structural_eq;
pub use store::{Listener, StateChange, StateSnapshot, StateStore, Subscription, WILDCARD};
