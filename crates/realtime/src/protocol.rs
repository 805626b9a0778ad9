//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the default namespace and text frames are supported; binary
//! attachments are rejected as protocol errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{RealtimeError, Result};

/// Engine.IO open packet body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds.
    pub ping_interval: u64,
    /// Milliseconds.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// How long the connection may stay silent before it counts as lost.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Socket.IO packet carried in an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack { id: Option<u64>, args: Vec<Value> },
    ConnectError(Value),
}

/// One Engine.IO frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl Packet {
    pub fn connect(auth: Option<Value>) -> Self {
        Packet::Message(SocketPacket::Connect(auth))
    }

    pub fn event(name: &str, payload: Value) -> Self {
        Packet::Message(SocketPacket::Event {
            name: name.to_string(),
            args: vec![payload],
        })
    }

    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::protocol("empty frame"))?;
        let rest = chars.as_str();

        let packet = match kind {
            '0' => Packet::Open(serde_json::from_str(rest)?),
            '1' => Packet::Close,
            '2' => Packet::Ping,
            '3' => Packet::Pong,
            '4' => Packet::Message(SocketPacket::decode(rest)?),
            '5' => Packet::Upgrade,
            '6' => Packet::Noop,
            other => {
                return Err(RealtimeError::protocol(format!(
                    "unknown engine packet type '{}'",
                    other
                )))
            }
        };
        Ok(packet)
    }

    pub fn encode(&self) -> Result<String> {
        let frame = match self {
            Packet::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Message(packet) => format!("4{}", packet.encode()?),
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
        };
        Ok(frame)
    }
}

impl SocketPacket {
    fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::protocol("empty socket packet"))?;
        let rest = skip_namespace(chars.as_str());

        let packet = match kind {
            '0' => SocketPacket::Connect(optional_json(rest)?),
            '1' => SocketPacket::Disconnect,
            '2' => {
                let (_, data) = split_ack_id(rest);
                let mut args = json_array(data)?;
                if args.is_empty() {
                    return Err(RealtimeError::protocol("event without a name"));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(RealtimeError::protocol(format!(
                            "event name is not a string: {}",
                            other
                        )))
                    }
                };
                SocketPacket::Event { name, args }
            }
            '3' => {
                let (id, data) = split_ack_id(rest);
                SocketPacket::Ack {
                    id,
                    args: json_array(data)?,
                }
            }
            '4' => SocketPacket::ConnectError(optional_json(rest)?.unwrap_or(Value::Null)),
            '5' | '6' => {
                return Err(RealtimeError::protocol(
                    "binary packets are not supported",
                ))
            }
            other => {
                return Err(RealtimeError::protocol(format!(
                    "unknown socket packet type '{}'",
                    other
                )))
            }
        };
        Ok(packet)
    }

    fn encode(&self) -> Result<String> {
        let body = match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", serde_json::to_string(&items)?)
            }
            SocketPacket::Ack { id, args } => format!(
                "3{}{}",
                id.map(|id| id.to_string()).unwrap_or_default(),
                serde_json::to_string(args)?
            ),
            SocketPacket::ConnectError(data) => format!("4{}", serde_json::to_string(data)?),
        };
        Ok(body)
    }
}

/// Human-readable reason of a connect error payload.
pub fn connect_error_message(data: &Value) -> String {
    match data {
        Value::String(message) => message.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => data.to_string(),
        },
        Value::Null => "connection refused".to_string(),
        other => other.to_string(),
    }
}

/// Drops a `/namespace,` prefix.
fn skip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => &rest[comma + 1..],
            None => "",
        }
    } else {
        rest
    }
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, rest);
    }
    (rest[..digits].parse().ok(), &rest[digits..])
}

fn optional_json(rest: &str) -> Result<Option<Value>> {
    if rest.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(rest)?))
    }
}

fn json_array(rest: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(rest)? {
        Value::Array(items) => Ok(items),
        other => Err(RealtimeError::protocol(format!(
            "expected a JSON array, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let packet = Packet::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let Packet::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "abc");
        assert_eq!(handshake.liveness_window(), Duration::from_secs(45));
    }

    #[test]
    fn decodes_data_update_event() {
        let packet = Packet::decode(
            r#"42["data-update",{"type":"clients","action":"created","data":{"id":1}}]"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                name: "data-update".into(),
                args: vec![json!({"type":"clients","action":"created","data":{"id":1}})],
            })
        );
    }

    #[test]
    fn event_with_namespace_and_ack_id() {
        let packet = Packet::decode(r#"42/admin,17["ping-me",1]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                name: "ping-me".into(),
                args: vec![json!(1)],
            })
        );
    }

    #[test]
    fn connect_packets() {
        assert_eq!(
            Packet::decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::connect(Some(json!({"sid": "xyz"})))
        );
        assert_eq!(Packet::decode("40").unwrap(), Packet::connect(None));
        assert_eq!(
            Packet::connect(Some(json!({"token": "t"}))).encode().unwrap(),
            r#"40{"token":"t"}"#
        );
    }

    #[test]
    fn connect_error_reason() {
        let Packet::Message(SocketPacket::ConnectError(data)) =
            Packet::decode(r#"44{"message":"unauthorized"}"#).unwrap()
        else {
            panic!("expected connect error");
        };
        assert_eq!(connect_error_message(&data), "unauthorized");
        assert_eq!(connect_error_message(&Value::Null), "connection refused");
    }

    #[test]
    fn encodes_join_event_and_heartbeat() {
        let join = Packet::event("join-room", json!({"room": "crm-updates"}));
        assert_eq!(
            join.encode().unwrap(),
            r#"42["join-room",{"room":"crm-updates"}]"#
        );
        assert_eq!(Packet::Pong.encode().unwrap(), "3");
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("9").is_err());
        assert!(Packet::decode("42").is_err());
        assert!(Packet::decode("42[]").is_err());
        assert!(Packet::decode("42[7]").is_err());
        assert!(Packet::decode(r#"451-["bin",{"_placeholder":true,"num":0}]"#).is_err());
    }
}
