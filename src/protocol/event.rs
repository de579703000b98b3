//! Inbound push and result event catalogue.
//!
//! Broadcasts are unsolicited pushes from the backend. The same channel
//! name may also carry response-shaped traffic, so only envelopes whose
//! `type` is exactly `"broadcast"` are treated as broadcasts.
//!
//! # Broadcast Channels
//!
//! | Channel | Payload (`data`) |
//! |---------|------------------|
//! | `models:list` | `{ models: [...] }` |
//! | `models:status` | `{ modelId, status, model? }` |
//! | `models:created` | `{ model }` |
//! | `models:updated` | `{ model }` |
//! | `models:deleted` | `{ modelId }` |
//! | `models:scanned` | scan summary, may be absent |
//! | `models:router-stopped` | none |
//! | `llama:status` | router status object |
//! | `metrics:update` | `{ metrics }` |
//! | `logs:entry` | `{ entry }` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Discriminator value of a broadcast envelope.
pub const BROADCAST_TYPE: &str = "broadcast";

/// Every response event the client listens for.
pub const RESULT_EVENTS: &[&str] = &[
    "models:list:result",
    "models:get:result",
    "models:create:result",
    "models:update:result",
    "models:delete:result",
    "models:start:result",
    "models:stop:result",
    "models:load:result",
    "models:unload:result",
    "models:scan:result",
    "models:cleanup:result",
    "metrics:get:result",
    "metrics:history:result",
    "logs:get:result",
    "logs:clear:result",
    "config:get:result",
    "config:update:result",
    "settings:get:result",
    "settings:update:result",
    "llama:status:result",
    "llama:start:result",
    "llama:stop:result",
    "llama:restart:result",
    "llama:config:result",
];

// ============================================================================
// BroadcastChannel
// ============================================================================

/// Known broadcast channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastChannel {
    /// Full model list replacement.
    ModelsList,
    /// Status change of one model.
    ModelStatus,
    /// Model record created.
    ModelCreated,
    /// Model record replaced.
    ModelUpdated,
    /// Model record removed.
    ModelDeleted,
    /// Directory scan finished.
    ModelsScanned,
    /// Router process stopped.
    RouterStopped,
    /// Router status pushed.
    LlamaStatus,
    /// Metrics sample pushed.
    MetricsUpdate,
    /// Log line pushed.
    LogEntry,
}

impl BroadcastChannel {
    /// All channels in registration order.
    pub const ALL: [Self; 10] = [
        Self::ModelsList,
        Self::ModelStatus,
        Self::ModelCreated,
        Self::ModelUpdated,
        Self::ModelDeleted,
        Self::ModelsScanned,
        Self::RouterStopped,
        Self::LlamaStatus,
        Self::MetricsUpdate,
        Self::LogEntry,
    ];

    /// Returns the wire event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelsList => "models:list",
            Self::ModelStatus => "models:status",
            Self::ModelCreated => "models:created",
            Self::ModelUpdated => "models:updated",
            Self::ModelDeleted => "models:deleted",
            Self::ModelsScanned => "models:scanned",
            Self::RouterStopped => "models:router-stopped",
            Self::LlamaStatus => "llama:status",
            Self::MetricsUpdate => "metrics:update",
            Self::LogEntry => "logs:entry",
        }
    }

    /// Looks up a channel by wire event name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_str() == name)
    }
}

impl fmt::Display for BroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BroadcastEnvelope
// ============================================================================

/// A qualifying broadcast received on a known channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEnvelope {
    /// Channel it arrived on.
    pub channel: BroadcastChannel,
    /// Payload; an empty object when the wire envelope had none.
    pub data: Value,
}

impl BroadcastEnvelope {
    /// Parses an inbound payload on `channel`.
    ///
    /// Returns `None` unless `type` is exactly `"broadcast"`.
    #[must_use]
    pub fn from_value(channel: BroadcastChannel, value: &Value) -> Option<Self> {
        if value.get("type").and_then(Value::as_str) != Some(BROADCAST_TYPE) {
            return None;
        }

        let data = match value.get("data") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(data) => data.clone(),
        };

        Some(Self { channel, data })
    }

    /// Parses the payload into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedBroadcast {
        match self.channel {
            BroadcastChannel::ModelsList => ParsedBroadcast::ModelsList {
                models: self.get_array("models"),
            },

            BroadcastChannel::ModelStatus => ParsedBroadcast::ModelStatus {
                model_id: self.get("modelId"),
                status: self.get("status"),
                model: self
                    .data
                    .get("model")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            },

            BroadcastChannel::ModelCreated => ParsedBroadcast::ModelCreated {
                model: self.get("model"),
            },

            BroadcastChannel::ModelUpdated => ParsedBroadcast::ModelUpdated {
                model: self.get("model"),
            },

            BroadcastChannel::ModelDeleted => ParsedBroadcast::ModelDeleted {
                model_id: self.get("modelId"),
            },

            BroadcastChannel::ModelsScanned => ParsedBroadcast::ModelsScanned {
                summary: self.data.clone(),
            },

            BroadcastChannel::RouterStopped => ParsedBroadcast::RouterStopped,

            BroadcastChannel::LlamaStatus => ParsedBroadcast::LlamaStatus {
                status: self.data.clone(),
            },

            BroadcastChannel::MetricsUpdate => ParsedBroadcast::MetricsUpdate {
                metrics: self
                    .get("metrics")
                    .unwrap_or_else(|| Value::Object(Map::new())),
            },

            BroadcastChannel::LogEntry => ParsedBroadcast::LogEntry {
                entry: self.get("entry"),
            },
        }
    }

    /// Gets a non-null field from `data`.
    #[inline]
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).filter(|v| !v.is_null()).cloned()
    }

    /// Gets an array field from `data`, empty if missing or not an array.
    #[inline]
    fn get_array(&self, key: &str) -> Vec<Value> {
        self.data
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// ParsedBroadcast
// ============================================================================

/// Typed broadcast payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBroadcast {
    /// Replace the model list.
    ModelsList {
        /// New list, empty if absent.
        models: Vec<Value>,
    },

    /// Merge a status change into one model.
    ModelStatus {
        /// Target model id.
        model_id: Option<Value>,
        /// New status.
        status: Option<Value>,
        /// Extra fields to merge.
        model: Map<String, Value>,
    },

    /// Append a model.
    ModelCreated {
        /// Model record.
        model: Option<Value>,
    },

    /// Replace a model by id.
    ModelUpdated {
        /// Model record.
        model: Option<Value>,
    },

    /// Remove a model by id.
    ModelDeleted {
        /// Target model id.
        model_id: Option<Value>,
    },

    /// Scan finished.
    ModelsScanned {
        /// Scan summary, empty object if absent.
        summary: Value,
    },

    /// Router stopped; every model is unloaded.
    RouterStopped,

    /// Router status pushed.
    LlamaStatus {
        /// Status object.
        status: Value,
    },

    /// Metrics sample.
    MetricsUpdate {
        /// Sample, empty object if absent.
        metrics: Value,
    },

    /// Log line.
    LogEntry {
        /// Entry record.
        entry: Option<Value>,
    },
}

// ============================================================================
// Tests
// ============================================================================
