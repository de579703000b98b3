//! Router, metrics, logs, config and settings operations.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::client::StateManager;
use crate::error::Result;
use crate::protocol::{ConfigCommand, LlamaCommand, LogsCommand, MetricsCommand, SettingsCommand};
use crate::state::keys;

// ============================================================================
// ServiceOps
// ============================================================================

/// Service operations bound to a [`StateManager`].
///
/// Obtained via [`StateManager::service`]. `config:` and `settings:`
/// requests use the fast timeout.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOps<'a> {
    manager: &'a StateManager,
}

impl<'a> ServiceOps<'a> {
    /// Creates the facade.
    #[inline]
    #[must_use]
    pub fn new(manager: &'a StateManager) -> Self {
        Self { manager }
    }

    // ========================================================================
    // Router
    // ========================================================================

    /// Fetches the router status and stores it under `routerStatus`.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn router_status(&self) -> Result<Value> {
        let status = self.manager.send(LlamaCommand::Status).await?;
        self.manager.set(keys::ROUTER_STATUS, status.clone());
        Ok(status)
    }

    /// Starts the router.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn start_router(&self) -> Result<Value> {
        self.manager.send(LlamaCommand::Start).await
    }

    /// Stops the router.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn stop_router(&self) -> Result<Value> {
        self.manager.send(LlamaCommand::Stop).await
    }

    /// Restarts the router.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn restart_router(&self) -> Result<Value> {
        self.manager.send(LlamaCommand::Restart).await
    }

    /// Applies router settings.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn configure_router(&self, settings: Value) -> Result<Value> {
        self.manager.send(LlamaCommand::Configure { settings }).await
    }

    // ========================================================================
    // Metrics & Logs
    // ========================================================================

    /// Fetches the latest metrics.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn metrics(&self) -> Result<Value> {
        self.manager.send(MetricsCommand::Get).await
    }

    /// Fetches metrics history; `params` is sent as the payload.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn metrics_history(&self, params: Value) -> Result<Value> {
        self.manager.send(MetricsCommand::History(params)).await
    }

    /// Fetches logs; `params` is sent as the payload.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn logs(&self, params: Value) -> Result<Value> {
        self.manager.send(LogsCommand::Get(params)).await
    }

    /// Clears server logs.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn clear_logs(&self) -> Result<Value> {
        self.manager.send(LogsCommand::Clear).await
    }

    // ========================================================================
    // Config & Settings
    // ========================================================================

    /// Reads the server configuration.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn config(&self) -> Result<Value> {
        self.manager.send(ConfigCommand::Get).await
    }

    /// Writes the server configuration.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn update_config(&self, config: Value) -> Result<Value> {
        self.manager.send(ConfigCommand::Update { config }).await
    }

    /// Reads user settings.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn settings(&self) -> Result<Value> {
        self.manager.send(SettingsCommand::Get).await
    }

    /// Writes user settings.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn update_settings(&self, settings: Value) -> Result<Value> {
        self.manager.send(SettingsCommand::Update { settings }).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok};

    use crate::transport::{MemoryTransport, events};

    fn connected() -> (StateManager, Arc<MemoryTransport>) {
        let manager = StateManager::default();
        let transport = MemoryTransport::new();
        manager.init(transport.clone());
        transport.trigger(events::ESTABLISHED, &json!({}));
        (manager, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_update_uses_fast_timeout() {
        let (manager, transport) = connected();
        let service = manager.service();

        let mut fut = tokio_test::task::spawn(service.update_settings(json!({"theme": "dark"})));
        assert_pending!(fut.poll());
        assert_eq!(
            transport.emitted_for("settings:update")[0]["settings"],
            json!({"theme": "dark"})
        );

        tokio::time::sleep(Duration::from_millis(5001)).await;
        let err = assert_ready_err!(fut.poll());
        assert_eq!(err.to_string(), "Timeout: settings:update after 5000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_status_is_stored() {
        let (manager, transport) = connected();
        let service = manager.service();

        let mut fut = tokio_test::task::spawn(service.router_status());
        assert_pending!(fut.poll());

        let id = transport.last_request_id("llama:status").expect("emitted");
        transport.trigger(
            "llama:status:result",
            &json!({"requestId": id, "success": true, "data": {"running": true}}),
        );

        assert_eq!(assert_ready_ok!(fut.poll()), json!({"running": true}));
        assert_eq!(manager.get(keys::ROUTER_STATUS), Some(json!({"running": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_params_are_payload() {
        let (manager, transport) = connected();
        let service = manager.service();

        let mut fut = tokio_test::task::spawn(service.logs(json!({"limit": 50})));
        assert_pending!(fut.poll());

        let payload = &transport.emitted_for("logs:get")[0];
        assert_eq!(payload["limit"], 50);
        assert!(payload["requestId"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_router_event_name() {
        let (manager, transport) = connected();
        let service = manager.service();

        let mut fut = tokio_test::task::spawn(service.configure_router(json!({"ctx": 4096})));
        assert_pending!(fut.poll());
        assert_eq!(transport.emitted_for("llama:config").len(), 1);
    }
}
