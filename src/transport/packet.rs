//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet. Message packets
//! (`4`) carry a Socket.IO packet:
//!
//! ```text
//! <engine type>[<socket type>[<namespace>,][<ack id>][<json>]]
//!
//! 0{"sid":"..","pingInterval":25000}   open
//! 2                                    ping
//! 40                                   connect default namespace
//! 42["models:list",{"requestId":".."}] event
//! ```
//!
//! Binary attachments are not supported.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// EnginePacket
// ============================================================================

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Handshake data from the server.
    Open(Value),
    /// Transport close.
    Close,
    /// Heartbeat probe.
    Ping(String),
    /// Heartbeat answer.
    Pong(String),
    /// Socket.IO payload.
    Message(SocketPacket),
    /// Transport upgrade.
    Upgrade,
    /// No-op.
    Noop,
}

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect (client) or connect acknowledgment (server).
    Connect(Option<Value>),
    /// Namespace disconnect.
    Disconnect,
    /// Named event with its first argument.
    Event {
        /// Event name.
        name: String,
        /// First argument, `null` if none.
        payload: Value,
        /// Acknowledgment id requested by the sender.
        ack_id: Option<u64>,
    },
    /// Acknowledgment of an earlier event.
    Ack {
        /// Acknowledged id.
        ack_id: u64,
        /// Acknowledgment arguments.
        data: Value,
    },
    /// Namespace connect refused.
    ConnectError(Value),
}

// ============================================================================
// Decoding
// ============================================================================

impl EnginePacket {
    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown packet types or malformed
    /// bodies, and [`Error::Json`] for invalid JSON data.
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty engine packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(SocketPacket::decode(body)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!("unknown engine packet type {other:?}"))),
        }
    }

    /// Encodes the packet as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(data) => format!("0{data}"),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Decodes a Socket.IO packet body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unsupported or malformed packets.
    pub fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty socket packet"))?;
        let rest = skip_namespace(chars.as_str());

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = rest[..digits].parse::<u64>().ok();
        let rest = &rest[digits..];

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(Self::Connect(data)),
            '1' => Ok(Self::Disconnect),
            '2' => Self::decode_event(data, ack_id),
            '3' => Ok(Self::Ack {
                ack_id: ack_id.ok_or_else(|| Error::protocol("ack without id"))?,
                data: data.unwrap_or(Value::Null),
            }),
            '4' => Ok(Self::ConnectError(data.unwrap_or(Value::Null))),
            '5' | '6' => Err(Error::protocol("binary packets are not supported")),
            other => Err(Error::protocol(format!("unknown socket packet type {other:?}"))),
        }
    }

    fn decode_event(data: Option<Value>, ack_id: Option<u64>) -> Result<Self> {
        let Some(Value::Array(mut args)) = data else {
            return Err(Error::protocol("event packet without argument array"));
        };
        if args.is_empty() {
            return Err(Error::protocol("event packet without name"));
        }

        let name = match args.remove(0) {
            Value::String(name) => name,
            other => return Err(Error::protocol(format!("event name is not a string: {other}"))),
        };
        let payload = if args.is_empty() {
            Value::Null
        } else {
            args.swap_remove(0)
        };

        Ok(Self::Event {
            name,
            payload,
            ack_id,
        })
    }

    /// Encodes the packet body for the default namespace.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event {
                name,
                payload,
                ack_id,
            } => {
                let args = json!([name, payload]);
                match ack_id {
                    Some(id) => format!("2{id}{args}"),
                    None => format!("2{args}"),
                }
            }
            Self::Ack { ack_id, data } => format!("3{ack_id}{data}"),
            Self::ConnectError(data) => format!("4{data}"),
        }
    }
}

/// Strips a `/namespace,` prefix.
fn skip_namespace(rest: &str) -> &str {
    if !rest.starts_with('/') {
        return rest;
    }
    match rest.find(',') {
        Some(comma) => &rest[comma + 1..],
        None => "",
    }
}

/// Builds the text frame for an outbound event.
#[must_use]
pub fn event_frame(name: &str, payload: Value) -> String {
    EnginePacket::Message(SocketPacket::Event {
        name: name.to_string(),
        payload,
        ack_id: None,
    })
    .encode()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open() {
        let packet = EnginePacket::decode(r#"0{"sid":"abc","pingInterval":25000}"#).expect("decode");
        match packet {
            EnginePacket::Open(data) => assert_eq!(data["sid"], "abc"),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_ping_pong() {
        assert_eq!(
            EnginePacket::decode("2").expect("decode"),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::Pong("probe".into()).encode(), "3probe");
    }

    #[test]
    fn test_decode_connect_ack() {
        let packet = EnginePacket::decode(r#"40{"sid":"xyz"}"#).expect("decode");
        match packet {
            EnginePacket::Message(SocketPacket::Connect(Some(data))) => {
                assert_eq!(data["sid"], "xyz");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_decode_event() {
        let packet = EnginePacket::decode(
            r#"42["models:list:result",{"requestId":"r1","success":true}]"#,
        )
        .expect("decode");

        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "models:list:result".into(),
                payload: json!({"requestId": "r1", "success": true}),
                ack_id: None,
            })
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/admin,17["ping",{}]"#).expect("decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "ping".into(),
                payload: json!({}),
                ack_id: Some(17),
            }
        );
    }

    #[test]
    fn test_decode_event_without_payload() {
        let packet = SocketPacket::decode(r#"2["models:router-stopped"]"#).expect("decode");
        match packet {
            SocketPacket::Event { payload, .. } => assert_eq!(payload, Value::Null),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_event_frame() {
        let frame = event_frame("config:get", json!({"requestId": "r"}));
        assert_eq!(frame, r#"42["config:get",{"requestId":"r"}]"#);
    }

    #[test]
    fn test_connect_frame() {
        assert_eq!(EnginePacket::Message(SocketPacket::Connect(None)).encode(), "40");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("42{}").is_err());
        assert!(EnginePacket::decode("42[]").is_err());
        assert!(EnginePacket::decode("451-[\"bin\"]").is_err());
    }
}
