//! Outbound command catalogue.
//!
//! Each command maps to an event name in `<resource>:<verb>` form and a
//! payload object. The correlator adds the `requestId` on dispatch.
//!
//! # Namespaces
//!
//! | Namespace | Commands |
//! |-----------|----------|
//! | `models` | list, get, create, update, delete, load, unload, scan, cleanup |
//! | `llama` | status, start, stop, restart, config |
//! | `metrics` | get, history |
//! | `logs` | get, clear |
//! | `config` | get, update |
//! | `settings` | get, update |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All outbound commands organized by namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Model catalogue commands.
    Models(ModelsCommand),
    /// Router process commands.
    Llama(LlamaCommand),
    /// Metrics commands.
    Metrics(MetricsCommand),
    /// Log commands.
    Logs(LogsCommand),
    /// Server configuration commands.
    Config(ConfigCommand),
    /// User settings commands.
    Settings(SettingsCommand),
}

impl Command {
    /// Splits the command into its event name and payload object.
    ///
    /// Commands without parameters yield an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a parameter fails to serialize, or
    /// [`Error::Protocol`] if the serialized form carries no event name.
    pub fn into_parts(self) -> Result<(String, Value)> {
        let value = serde_json::to_value(&self)?;
        let Value::Object(mut fields) = value else {
            return Err(Error::protocol("command did not serialize to an object"));
        };

        let event = match fields.remove("event") {
            Some(Value::String(event)) => event,
            _ => return Err(Error::protocol("command has no event name")),
        };

        let payload = match fields.remove("payload") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(payload) => payload,
        };

        Ok((event, payload))
    }
}

impl From<ModelsCommand> for Command {
    fn from(command: ModelsCommand) -> Self {
        Self::Models(command)
    }
}

impl From<LlamaCommand> for Command {
    fn from(command: LlamaCommand) -> Self {
        Self::Llama(command)
    }
}

impl From<MetricsCommand> for Command {
    fn from(command: MetricsCommand) -> Self {
        Self::Metrics(command)
    }
}

impl From<LogsCommand> for Command {
    fn from(command: LogsCommand) -> Self {
        Self::Logs(command)
    }
}

impl From<ConfigCommand> for Command {
    fn from(command: ConfigCommand) -> Self {
        Self::Config(command)
    }
}

impl From<SettingsCommand> for Command {
    fn from(command: SettingsCommand) -> Self {
        Self::Settings(command)
    }
}

// ============================================================================
// Models Commands
// ============================================================================

/// Model catalogue commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ModelsCommand {
    /// List all models.
    #[serde(rename = "models:list")]
    List,

    /// Fetch one model.
    #[serde(rename = "models:get")]
    Get {
        /// Model id.
        #[serde(rename = "modelId")]
        model_id: String,
    },

    /// Create a model record.
    #[serde(rename = "models:create")]
    Create {
        /// Model record.
        model: Value,
    },

    /// Patch a model record.
    #[serde(rename = "models:update")]
    Update {
        /// Model id.
        #[serde(rename = "modelId")]
        model_id: String,
        /// Fields to change.
        updates: Value,
    },

    /// Delete a model record.
    #[serde(rename = "models:delete")]
    Delete {
        /// Model id.
        #[serde(rename = "modelId")]
        model_id: String,
    },

    /// Load a model into the router.
    #[serde(rename = "models:load")]
    Load {
        /// Model name as known by the router.
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// Unload a model from the router.
    #[serde(rename = "models:unload")]
    Unload {
        /// Model name as known by the router.
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// Rescan the models directory.
    #[serde(rename = "models:scan")]
    Scan,

    /// Remove records whose files are gone.
    #[serde(rename = "models:cleanup")]
    Cleanup,
}

// ============================================================================
// Llama Commands
// ============================================================================

/// Router process commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum LlamaCommand {
    /// Router status.
    #[serde(rename = "llama:status")]
    Status,

    /// Start the router.
    #[serde(rename = "llama:start")]
    Start,

    /// Stop the router.
    #[serde(rename = "llama:stop")]
    Stop,

    /// Restart the router.
    #[serde(rename = "llama:restart")]
    Restart,

    /// Apply router settings.
    #[serde(rename = "llama:config")]
    Configure {
        /// Settings object.
        settings: Value,
    },
}

// ============================================================================
// Metrics Commands
// ============================================================================

/// Metrics commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum MetricsCommand {
    /// Latest metrics.
    #[serde(rename = "metrics:get")]
    Get,

    /// Metrics history; the value holds query parameters.
    #[serde(rename = "metrics:history")]
    History(Value),
}

// ============================================================================
// Logs Commands
// ============================================================================

/// Log commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum LogsCommand {
    /// Fetch logs; the value holds query parameters.
    #[serde(rename = "logs:get")]
    Get(Value),

    /// Clear logs.
    #[serde(rename = "logs:clear")]
    Clear,
}

// ============================================================================
// Config Commands
// ============================================================================

/// Server configuration commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ConfigCommand {
    /// Read configuration.
    #[serde(rename = "config:get")]
    Get,

    /// Write configuration.
    #[serde(rename = "config:update")]
    Update {
        /// Configuration object.
        config: Value,
    },
}

// ============================================================================
// Settings Commands
// ============================================================================

/// User settings commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum SettingsCommand {
    /// Read settings.
    #[serde(rename = "settings:get")]
    Get,

    /// Write settings.
    #[serde(rename = "settings:update")]
    Update {
        /// Settings object.
        settings: Value,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_unit_command_has_empty_payload() {
        let (event, payload) = Command::from(ModelsCommand::List)
            .into_parts()
            .expect("parts");
        assert_eq!(event, "models:list");
        assert_eq!(payload, json!({}));
    }

    #[test]
    fn test_struct_command_payload_uses_wire_names() {
        let command = ModelsCommand::Update {
            model_id: "m1".into(),
            updates: json!({"ctx_size": 4096}),
        };
        let (event, payload) = Command::from(command).into_parts().expect("parts");

        assert_eq!(event, "models:update");
        assert_eq!(payload, json!({"modelId": "m1", "updates": {"ctx_size": 4096}}));
    }

    #[test]
    fn test_load_uses_model_name() {
        let command = ModelsCommand::Load {
            model_name: "llama-3-8b".into(),
        };
        let (event, payload) = Command::from(command).into_parts().expect("parts");

        assert_eq!(event, "models:load");
        assert_eq!(payload, json!({"modelName": "llama-3-8b"}));
    }

    #[test]
    fn test_newtype_params_become_payload() {
        let command = LogsCommand::Get(json!({"limit": 50}));
        let (event, payload) = Command::from(command).into_parts().expect("parts");

        assert_eq!(event, "logs:get");
        assert_eq!(payload, json!({"limit": 50}));
    }

    #[test]
    fn test_null_params_become_empty_object() {
        let command = MetricsCommand::History(Value::Null);
        let (event, payload) = Command::from(command).into_parts().expect("parts");

        assert_eq!(event, "metrics:history");
        assert_eq!(payload, json!({}));
    }

    #[test]
    fn test_namespaces() {
        let cases: Vec<(Command, &str)> = vec![
            (LlamaCommand::Restart.into(), "llama:restart"),
            (
                LlamaCommand::Configure { settings: json!({}) }.into(),
                "llama:config",
            ),
            (ConfigCommand::Get.into(), "config:get"),
            (
                SettingsCommand::Update { settings: json!({}) }.into(),
                "settings:update",
            ),
            (ModelsCommand::Cleanup.into(), "models:cleanup"),
        ];

        for (command, expected) in cases {
            let (event, _) = command.into_parts().expect("parts");
            assert_eq!(event, expected);
        }
    }
}
