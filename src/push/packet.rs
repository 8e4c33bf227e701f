//! Engine.IO v4 / Socket.IO v4 text packet codec.
//!
//! Only what the dashboard needs is supported: text packets on the default
//! namespace. Binary packets are rejected.

use crate::error::{Result, SessionError};
use serde::Deserialize;
use serde_json::Value;

/// Separates packets inside one long-polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Body of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

fn decode_error(message: impl Into<String>) -> SessionError {
    SessionError::Decode {
        format: "Engine.IO",
        message: message.into(),
    }
}

impl EnginePacket {
    pub fn decode(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| decode_error("empty packet"))?;
        let data = chars.as_str();
        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(data).map_err(|e| {
                decode_error(format!("bad handshake: {}", e))
            })?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(decode_error("binary packets are not supported")),
            other => Err(decode_error(format!("unknown packet type '{}'", other))),
        }
    }

    /// Text form. The `open` packet is server-only and never encoded.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Split a polling body into its packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>> {
    body.split(RECORD_SEPARATOR)
        .filter(|raw| !raw.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

/// Socket.IO packet carried inside an Engine.IO `message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn event(name: &str, arg: Value) -> Self {
        SocketPacket::Event {
            name: name.to_string(),
            args: vec![arg],
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| decode_error("empty socket packet"))?;
        let mut rest = chars.as_str();

        // `/ns,` prefix; only the root namespace is used by the broker
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(idx) => &rest[idx + 1..],
                None => "",
            };
        }
        // ack id
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest).map_err(|e| {
                decode_error(format!("bad socket payload: {}", e))
            })?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect(data)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => match data {
                Some(Value::Array(mut items)) if !items.is_empty() => {
                    let name = match items.remove(0) {
                        Value::String(name) => name,
                        other => return Err(decode_error(format!("event name is not a string: {}", other))),
                    };
                    Ok(SocketPacket::Event { name, args: items })
                }
                _ => Err(decode_error("event without a name")),
            },
            '4' => Ok(SocketPacket::ConnectError(data.unwrap_or(Value::Null))),
            '3' | '5' | '6' => Err(decode_error("acks and binary events are not supported")),
            other => Err(decode_error(format!("unknown socket packet type '{}'", other))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", Value::Array(items))
            }
            SocketPacket::ConnectError(data) => format!("4{}", data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_handshake() {
        let packets = decode_payload(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match &packets[..] {
            [EnginePacket::Open(h)] => {
                assert_eq!(h.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(h.ping_interval, 25000);
                assert_eq!(h.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packets: {other:?}"),
        }
    }

    #[test]
    fn test_decode_batched_payload() {
        let body = "40{\"sid\":\"abc\"}\u{1e}2\u{1e}42[\"USER_JOINED\",{\"id\":\"u1\"}]\u{1e}6";
        let packets = decode_payload(body).unwrap();
        assert_eq!(packets.len(), 4);
        assert_eq!(packets[1], EnginePacket::Ping(String::new()));
        assert_eq!(packets[3], EnginePacket::Noop);

        let EnginePacket::Message(ref connect) = packets[0] else {
            panic!("expected message");
        };
        assert_eq!(
            SocketPacket::decode(connect).unwrap(),
            SocketPacket::Connect(Some(json!({ "sid": "abc" })))
        );

        let EnginePacket::Message(ref event) = packets[2] else {
            panic!("expected message");
        };
        assert_eq!(
            SocketPacket::decode(event).unwrap(),
            SocketPacket::Event {
                name: "USER_JOINED".to_string(),
                args: vec![json!({ "id": "u1" })],
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode("2/admin,12[\"RECOGNITION_DATA_ADDED\"]").unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "RECOGNITION_DATA_ADDED".to_string(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_encode_join_emit() {
        let packet = SocketPacket::event("joinMeeting", json!("abc-defg"));
        let engine = EnginePacket::Message(packet.encode());
        assert_eq!(engine.encode(), "42[\"joinMeeting\",\"abc-defg\"]");
        assert_eq!(
            encode_payload(&[EnginePacket::Pong(String::new()), engine]),
            "3\u{1e}42[\"joinMeeting\",\"abc-defg\"]"
        );
    }

    #[test]
    fn test_rejects_binary_and_unknown() {
        assert!(EnginePacket::decode("bAQID").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(SocketPacket::decode("2{}").is_err());
        assert!(SocketPacket::decode("5-[\"x\",{\"_placeholder\":true,\"num\":0}]").is_err());
    }
}
