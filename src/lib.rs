//! Llama proxy client - reactive state and request correlation.
//!
//! This library is the client core of the llama proxy dashboard. It keeps a
//! subscribable state snapshot and turns a Socket.IO event connection into
//! correlated request/response calls plus state-mutating broadcasts.
//!
//! # Architecture
//!
//! - **StateStore**: named JSON values, per-key and wildcard subscribers,
//!   notifications suppressed for structurally equal writes
//! - **ConnectionLifecycle**: connected flag with an auto-promote fallback
//! - **RequestCorrelator**: `requestId` tagging, deferred dispatch while
//!   disconnected, namespace-dependent timeouts
//! - **ResponseRouter** / **BroadcastRouter**: inbound routing by envelope
//! - **StateManager**: wires all of the above to one transport
//!
//! # Quick Start
//!
//! ```no_run
//! use llama_proxy_client::{ClientConfig, Result, SocketIoOptions, SocketIoTransport, StateManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = StateManager::new(ClientConfig::default());
//!
//!     let options = SocketIoOptions::new("http://localhost:3000")?;
//!     manager.init(SocketIoTransport::connect(&options).await?);
//!
//!     let _sub = manager.subscribe("models", |change| {
//!         println!("models changed: {}", change.value);
//!     });
//!
//!     let models = manager.models().refresh().await?;
//!     println!("{models}");
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Correlator, routers and [`StateManager`] |
//! | [`config`] | [`ClientConfig`] and its builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`facade`] | Model and service operations |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes and the command catalogue |
//! | [`state`] | [`StateStore`] and subscriptions |
//! | [`transport`] | Transport trait, Socket.IO and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Request correlation, routing and the state manager.
pub mod client;

/// Client configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Domain facades.
pub mod facade;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// Reactive state store.
pub mod state;

/// Event transports and connection lifecycle.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{BroadcastHooks, PendingTable, RequestCorrelator, StateManager};

// Configuration
pub use config::{ClientConfig, ClientConfigBuilder};

// Error types
pub use error::{Error, Result};

// Facades
pub use facade::{ModelOps, ServiceOps};

// Identifier types
pub use identifiers::{HandlerId, RequestId, SubscriptionId};

// Protocol types
pub use protocol::{BroadcastChannel, Command};

// State types
pub use state::{StateChange, StateSnapshot, StateStore, Subscription};

// Transport types
pub use transport::{
    ConnectionLifecycle, MemoryTransport, SocketIoOptions, SocketIoTransport, Transport,
};
