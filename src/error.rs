//! Error types for the llama proxy client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use llama_proxy_client::{Result, StateManager};
//!
//! async fn example(manager: &StateManager) -> Result<()> {
//!     let models = manager.models().list().await?;
//!     println!("{models}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Request | [`Error::RequestTimeout`], [`Error::RequestFailed`] |
//! | Domain | [`Error::ModelNotFound`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Message used when a failed response carries no error message.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// No connected transition while a request awaited dispatch.
    ///
    /// The request was never emitted.
    #[error("Connection timeout")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport or manager shut down while a call was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed frame on the wire.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No matching response within the namespace timeout.
    #[error("Timeout: {event} after {timeout_ms}ms")]
    RequestTimeout {
        /// Event name the request was emitted under.
        event: String,
        /// Correlation id of the abandoned request.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Backend explicitly reported failure.
    ///
    /// The display text is the backend message verbatim.
    #[error("{message}")]
    RequestFailed {
        /// Message taken from the response envelope.
        message: String,
    },

    // ========================================================================
    // Domain Errors
    // ========================================================================
    /// Model id not present in the `models` state key.
    #[error("Model not found: {model_id}")]
    ModelNotFound {
        /// The missing model id.
        model_id: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(event: impl Into<String>, request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            event: event.into(),
            request_id,
            timeout_ms,
        }
    }

    /// Creates a request failed error.
    ///
    /// Falls back to [`DEFAULT_FAILURE_MESSAGE`] when `message` is `None`
    /// or empty.
    #[inline]
    pub fn request_failed(message: Option<String>) -> Self {
        Self::RequestFailed {
            message: message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        }
    }

    /// Creates a model not found error.
    #[inline]
    pub fn model_not_found(model_id: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model_id: model_id.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed if the caller retries; the client
    /// never retries on its own.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
