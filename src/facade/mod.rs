//! Domain facades over [`StateManager::send`](crate::StateManager::send).
//!
//! Each method maps to one catalogued command and returns the response
//! `data`. Failures surface as the correlator reports them; facades never
//! retry.
//!
//! | Facade | Namespaces |
//! |--------|------------|
//! | [`ModelOps`] | `models` |
//! | [`ServiceOps`] | `llama`, `metrics`, `logs`, `config`, `settings` |

// ============================================================================
// Submodules
// ============================================================================

/// Model catalogue operations.
pub mod models;

/// Router, metrics, logs, config and settings operations.
pub mod service;

// ============================================================================
// Re-exports
// ============================================================================

pub use models::ModelOps;
pub use service::ServiceOps;
