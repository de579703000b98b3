//! Client configuration.
//!
//! Timeouts, buffer caps and the namespace timeout policy used by the
//! correlator and routers.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use llama_proxy_client::ClientConfig;
//!
//! # fn example() -> llama_proxy_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .fallback_delay(Duration::from_secs(1))
//!     .log_cap(50)
//!     .build()?;
//!
//! assert_eq!(config.timeout_for("config:get"), Duration::from_secs(5));
//! assert_eq!(config.timeout_for("models:load"), Duration::from_secs(120));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Grace period before a silent transport is promoted to connected.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(3000);

/// How long a request issued while disconnected waits for a connection.
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_millis(10_000);

/// Timeout for requests in a fast namespace.
pub const DEFAULT_FAST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Timeout for every other request (model loads can take minutes).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Event prefixes that use [`DEFAULT_FAST_TIMEOUT`].
pub const DEFAULT_FAST_PREFIXES: &[&str] = &["config:", "settings:"];

/// Retained metric samples.
pub const DEFAULT_METRICS_HISTORY_CAP: usize = 200;

/// Retained log entries.
pub const DEFAULT_LOG_CAP: usize = 100;

// ============================================================================
// ClientConfig
// ============================================================================

/// Runtime configuration for a [`StateManager`](crate::StateManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Delay before auto-promoting a silent transport to connected.
    pub fallback_delay: Duration,

    /// Maximum wait for a connection before a deferred request fails.
    pub connect_wait: Duration,

    /// Timeout for events matching one of `fast_prefixes`.
    pub fast_timeout: Duration,

    /// Timeout for all other events.
    pub request_timeout: Duration,

    /// Event-name prefixes that get `fast_timeout`.
    pub fast_prefixes: Vec<String>,

    /// Capacity of the `metricsHistory` buffer.
    pub metrics_history_cap: usize,

    /// Capacity of the `logs` buffer.
    pub log_cap: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            connect_wait: DEFAULT_CONNECT_WAIT,
            fast_timeout: DEFAULT_FAST_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fast_prefixes: DEFAULT_FAST_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            metrics_history_cap: DEFAULT_METRICS_HISTORY_CAP,
            log_cap: DEFAULT_LOG_CAP,
        }
    }
}

impl ClientConfig {
    /// Creates a builder starting from the defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the response timeout for `event`.
    #[must_use]
    pub fn timeout_for(&self, event: &str) -> Duration {
        if self.is_fast_event(event) {
            self.fast_timeout
        } else {
            self.request_timeout
        }
    }

    /// Returns `true` if `event` belongs to a fast namespace.
    #[inline]
    #[must_use]
    pub fn is_fast_event(&self, event: &str) -> bool {
        self.fast_prefixes
            .iter()
            .any(|prefix| event.starts_with(prefix.as_str()))
    }
}

// ============================================================================
// ClientConfigBuilder
// ============================================================================

/// Fluent builder for [`ClientConfig`].
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a builder with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the auto-promote delay.
    #[inline]
    #[must_use]
    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.config.fallback_delay = delay;
        self
    }

    /// Sets the connection wait for deferred requests.
    #[inline]
    #[must_use]
    pub fn connect_wait(mut self, wait: Duration) -> Self {
        self.config.connect_wait = wait;
        self
    }

    /// Sets the fast-namespace timeout.
    #[inline]
    #[must_use]
    pub fn fast_timeout(mut self, timeout: Duration) -> Self {
        self.config.fast_timeout = timeout;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Replaces the fast-namespace prefixes.
    #[must_use]
    pub fn fast_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fast_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the metrics history capacity.
    #[inline]
    #[must_use]
    pub fn metrics_history_cap(mut self, cap: usize) -> Self {
        self.config.metrics_history_cap = cap;
        self
    }

    /// Sets the log tail capacity.
    #[inline]
    #[must_use]
    pub fn log_cap(mut self, cap: usize) -> Self {
        self.config.log_cap = cap;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if any duration is zero
    /// - [`Error::Config`] if any buffer capacity is zero
    pub fn build(self) -> Result<ClientConfig> {
        self.validate_durations()?;
        self.validate_caps()?;
        Ok(self.config)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfigBuilder {
    fn validate_durations(&self) -> Result<()> {
        let durations = [
            ("fallback_delay", self.config.fallback_delay),
            ("connect_wait", self.config.connect_wait),
            ("fast_timeout", self.config.fast_timeout),
            ("request_timeout", self.config.request_timeout),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }

    fn validate_caps(&self) -> Result<()> {
        if self.config.metrics_history_cap == 0 {
            return Err(Error::config("metrics_history_cap must be at least 1"));
        }
        if self.config.log_cap == 0 {
            return Err(Error::config("log_cap must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
