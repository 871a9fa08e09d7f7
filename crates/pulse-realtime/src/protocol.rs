//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the subset a notification subscriber needs: the Engine.IO open,
//! ping/pong, close and message packets, and the Socket.IO connect,
//! disconnect, event and connect-error packets on the default namespace.

use pulse_protocol_types::ChannelError;
use serde::Deserialize;
use serde_json::Value;

/// Client reply to a server ping.
pub const PONG: &str = "3";

/// Socket.IO connect request for the default namespace.
pub const CONNECT: &str = "40";

/// Socket.IO disconnect for the default namespace.
pub const DISCONNECT: &str = "41";

/// Handshake data sent by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: Option<u64>,
    #[serde(default)]
    pub ping_timeout: Option<u64>,
}

/// Upper bound on the liveness window a server can ask for.
pub const MAX_LIVENESS_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

impl OpenPayload {
    /// How long the connection may stay silent before it is considered
    /// dead, in milliseconds. Capped at [`MAX_LIVENESS_WINDOW_MS`].
    pub fn liveness_window_ms(&self) -> Option<u64> {
        match (self.ping_interval, self.ping_timeout) {
            (Some(interval), Some(timeout)) => {
                Some(interval.saturating_add(timeout).min(MAX_LIVENESS_WINDOW_MS))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Value),
    /// Acks and binary packets; not used by this client.
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

fn protocol_err(msg: impl Into<String>) -> ChannelError {
    ChannelError::Protocol(msg.into())
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, ChannelError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or_else(|| protocol_err("empty frame"))?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| protocol_err(format!("invalid open packet: {}", e))),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '6' => Ok(EnginePacket::Noop),
        other => Err(protocol_err(format!("unknown engine packet type {}", other))),
    }
}

fn decode_socket(packet: &str) -> Result<SocketPacket, ChannelError> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| protocol_err("empty socket packet"))?;
    let body = skip_namespace_and_ack(chars.as_str());

    match kind {
        '0' => {
            if body.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                serde_json::from_str(body)
                    .map(|v| SocketPacket::Connect(Some(v)))
                    .map_err(|e| protocol_err(format!("invalid connect packet: {}", e)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let mut args: Vec<Value> = serde_json::from_str(body)
                .map_err(|e| protocol_err(format!("invalid event packet: {}", e)))?;
            if args.is_empty() {
                return Err(protocol_err("event packet without a name"));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => return Err(protocol_err(format!("event name is not a string: {}", other))),
            };
            Ok(SocketPacket::Event { name, args })
        }
        '4' => Ok(SocketPacket::ConnectError(
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())),
        )),
        _ => Ok(SocketPacket::Other(packet.to_string())),
    }
}

/// Strip an optional `/namespace,` prefix and ack id ahead of the payload.
fn skip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Encode a Socket.IO event on the default namespace.
pub fn encode_event(name: &str, args: &[Value]) -> String {
    let mut frame = Vec::with_capacity(args.len() + 1);
    frame.push(Value::String(name.to_string()));
    frame.extend(args.iter().cloned());
    format!("42{}", Value::Array(frame))
}
