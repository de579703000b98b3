//! Wire message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `RequestEnvelope` | Client → Server | Command tagged with `requestId` |
//! | `ResponseEnvelope` | Server → Client | Result under `<event>:result` |
//! | `BroadcastEnvelope` | Server → Client | Unsolicited push, `type: "broadcast"` |
//!
//! # Event Naming
//!
//! Events follow `<resource>:<verb>` format:
//!
//! - `models:list`
//! - `config:update`
//! - `llama:restart`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound command catalogue |
//! | `event` | Broadcast channels and result-event catalogue |
//! | `request` | Request and response envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command catalogue.
pub mod command;

/// Broadcast and result event types.
pub mod event;

/// Request and response envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    Command, ConfigCommand, LlamaCommand, LogsCommand, MetricsCommand, ModelsCommand,
    SettingsCommand,
};
pub use event::{BroadcastChannel, BroadcastEnvelope, ParsedBroadcast, RESULT_EVENTS};
pub use request::{ErrorBody, RequestEnvelope, ResponseEnvelope, result_event};
