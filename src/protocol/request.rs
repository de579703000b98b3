//! Request and response envelopes.
//!
//! # Outbound
//!
//! Emitted under the command's event name:
//!
//! ```json
//! { "modelId": "m1", "requestId": "req_1700000000000_k3j9x0a1b" }
//! ```
//!
//! # Inbound
//!
//! Received under `<event>:result`:
//!
//! ```json
//! { "requestId": "req_...", "success": true, "data": { ... } }
//! { "requestId": "req_...", "success": false, "error": { "message": "..." } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Payload field carrying the correlation id.
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Suffix of every response event name.
pub const RESULT_SUFFIX: &str = ":result";

// ============================================================================
// RequestEnvelope
// ============================================================================

/// An outbound request: caller payload plus correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Event name, e.g. `models:list`.
    pub event: String,
    /// Caller payload fields.
    pub payload: Map<String, Value>,
    /// Correlation id.
    pub request_id: RequestId,
}

impl RequestEnvelope {
    /// Creates an envelope from a caller payload.
    ///
    /// `null` becomes an empty object. Any other non-object payload is
    /// dropped since it has no fields to spread.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value, request_id: RequestId) -> Self {
        let event = event.into();
        let payload = match payload {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                warn!(event = %event, payload = %other, "Dropping non-object request payload");
                Map::new()
            }
        };

        Self {
            event,
            payload,
            request_id,
        }
    }

    /// Returns the JSON object sent over the transport.
    ///
    /// A caller-supplied `requestId` field is overwritten.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut fields = self.payload.clone();
        fields.insert(
            REQUEST_ID_FIELD.to_string(),
            Value::String(self.request_id.as_str().to_string()),
        );
        Value::Object(fields)
    }
}

// ============================================================================
// ResponseEnvelope
// ============================================================================

/// An inbound response matched to a pending request by `request_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    /// Echoed correlation id; responses without one are ignored.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<RequestId>,

    /// Whether the backend succeeded.
    #[serde(default)]
    pub success: bool,

    /// Result payload (if success).
    #[serde(default)]
    pub data: Option<Value>,

    /// Failure details (if not success).
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Failure details inside a response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    /// Parses an inbound payload.
    ///
    /// Fields are read one at a time so that a wrongly typed field falls
    /// back to its default instead of discarding the envelope. A non-bool
    /// `success` counts as failure. An `error` that is not an object, or a
    /// `message` that is not a non-empty string, leaves the message unset.
    ///
    /// Returns `None` only for payloads that are not objects.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let request_id = value
            .get("requestId")
            .and_then(Value::as_str)
            .map(RequestId::from_wire);
        let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
        let data = value.get("data").cloned();
        let error = value.get("error").map(|_| ErrorBody {
            message: value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .map(str::to_string),
        });

        Some(Self {
            request_id,
            success,
            data,
            error,
        })
    }

    /// Converts the envelope into the caller-facing outcome.
    ///
    /// Success yields `data`, or an empty object if it is absent. Failure
    /// yields [`Error::RequestFailed`] with the envelope's message.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(match self.data {
                Some(Value::Null) | None => Value::Object(Map::new()),
                Some(data) => data,
            });
        }

        let message = self.error.and_then(|e| e.message);
        Err(Error::request_failed(message))
    }
}

/// Returns the response event name for `event`.
#[inline]
#[must_use]
pub fn result_event(event: &str) -> String {
    format!("{event}{RESULT_SUFFIX}")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let id = RequestId::from_wire("req_1_abcdefghi");
        let envelope = RequestEnvelope::new("models:get", json!({"modelId": "m1"}), id);

        assert_eq!(
            envelope.to_wire(),
            json!({"modelId": "m1", "requestId": "req_1_abcdefghi"})
        );
    }

    #[test]
    fn test_request_id_overrides_caller_field() {
        let id = RequestId::from_wire("req_real");
        let envelope = RequestEnvelope::new("x:y", json!({"requestId": "spoofed"}), id);

        assert_eq!(envelope.to_wire()["requestId"], "req_real");
    }

    #[test]
    fn test_null_payload_is_empty_object() {
        let envelope = RequestEnvelope::new("x:y", Value::Null, RequestId::from_wire("r"));
        assert_eq!(envelope.to_wire(), json!({"requestId": "r"}));
    }

    #[test]
    fn test_success_response() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "req_1",
            "success": true,
            "data": {"models": []},
            "timestamp": 1
        }))
        .expect("parse");

        assert_eq!(response.request_id, Some(RequestId::from_wire("req_1")));
        assert_eq!(response.into_result().expect("ok"), json!({"models": []}));
    }

    #[test]
    fn test_success_without_data_defaults_to_empty_object() {
        let response =
            ResponseEnvelope::from_value(&json!({"requestId": "r", "success": true})).expect("parse");
        assert_eq!(response.into_result().expect("ok"), json!({}));
    }

    #[test]
    fn test_failure_with_empty_error_uses_default_message() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "r",
            "success": false,
            "error": {}
        }))
        .expect("parse");

        let err = response.into_result().expect_err("should fail");
        assert_eq!(err.to_string(), "Request failed");
    }

    #[test]
    fn test_failure_message_is_preserved() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "r",
            "success": false,
            "error": {"message": "Max models reached"}
        }))
        .expect("parse");

        let err = response.into_result().expect_err("should fail");
        assert!(matches!(err, Error::RequestFailed { ref message } if message == "Max models reached"));
    }

    #[test]
    fn test_missing_request_id() {
        let response = ResponseEnvelope::from_value(&json!({"success": true})).expect("parse");
        assert!(response.request_id.is_none());
    }

    #[test]
    fn test_string_error_uses_default_message() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "r",
            "success": false,
            "error": "llama-server not running"
        }))
        .expect("parse");

        assert_eq!(response.request_id, Some(RequestId::from_wire("r")));
        let err = response.into_result().expect_err("should fail");
        assert_eq!(err.to_string(), "Request failed");
    }

    #[test]
    fn test_wrongly_typed_fields_fall_back_to_defaults() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "r",
            "success": "yes",
            "error": {"message": 42}
        }))
        .expect("parse");

        let err = response.into_result().expect_err("non-bool success is failure");
        assert_eq!(err.to_string(), "Request failed");
    }

    #[test]
    fn test_empty_error_message_uses_default() {
        let response = ResponseEnvelope::from_value(&json!({
            "requestId": "r",
            "success": false,
            "error": {"message": ""}
        }))
        .expect("parse");

        let err = response.into_result().expect_err("should fail");
        assert_eq!(err.to_string(), "Request failed");
    }

    #[test]
    fn test_non_string_request_id_is_absent() {
        let response =
            ResponseEnvelope::from_value(&json!({"requestId": 7, "success": true})).expect("parse");
        assert!(response.request_id.is_none());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(ResponseEnvelope::from_value(&json!("nope")).is_none());
        assert!(ResponseEnvelope::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_result_event() {
        assert_eq!(result_event("models:list"), "models:list:result");
    }
}
