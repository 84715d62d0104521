//! Typed event payloads, parsed once at the sidecar boundary.

use super::protocol::BridgeEvent;
use super::ClientError;
use serde_json::Value;

/// Lifecycle and message events emitted by the chat client, in emission order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Ready,
    /// Raw pairing string to be rendered as a QR code.
    Qr(String),
    Authenticated,
    /// Disconnect reason as reported by the client.
    Disconnected(String),
    Message(InboundMessage),
}

impl ClientEvent {
    /// Map a sidecar event frame to a client event. Unknown event names yield `Ok(None)`.
    pub fn from_bridge(event: BridgeEvent) -> Result<Option<Self>, ClientError> {
        let ev = match event.event.as_str() {
            "ready" => ClientEvent::Ready,
            "authenticated" => ClientEvent::Authenticated,
            "qr" => {
                let qr = event
                    .payload
                    .get("qr")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ClientError::Payload("qr event without qr string".to_string()))?;
                ClientEvent::Qr(qr.to_string())
            }
            "disconnected" => {
                let reason = match event.payload.get("reason") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => "unknown".to_string(),
                    Some(other) => other.to_string(),
                };
                ClientEvent::Disconnected(reason)
            }
            "message" => ClientEvent::Message(InboundMessage::from_payload(event.payload)?),
            _ => return Ok(None),
        };
        Ok(Some(ev))
    }
}

/// Ids arrive either as plain strings or as `{ "_serialized": "..." }` objects.
fn serialized_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(o) => o
            .get("_serialized")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(str::to_string)
}

/// Numeric timestamps only; strings, null and missing values are `None`.
fn lenient_timestamp(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        _ => None,
    }
}

/// An inbound chat message. `raw` keeps the full client payload for the webhook.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub body: String,
    /// Sender chat address (e.g. `15551234567@c.us`).
    pub from: String,
    /// Unix seconds, when the client reported a numeric timestamp.
    pub timestamp: Option<i64>,
    pub has_media: bool,
    pub raw: Value,
}

impl InboundMessage {
    pub fn from_payload(payload: Value) -> Result<Self, ClientError> {
        let id = payload
            .get("id")
            .and_then(serialized_id)
            .ok_or_else(|| ClientError::Payload("message without id".to_string()))?;
        Ok(Self {
            id,
            body: opt_str(&payload, "body").unwrap_or_default(),
            from: opt_str(&payload, "from").unwrap_or_default(),
            timestamp: lenient_timestamp(payload.get("timestamp")),
            has_media: payload
                .get("hasMedia")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            raw: payload,
        })
    }
}

/// Chat record resolved for a message.
#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub raw: Value,
}

impl ChatInfo {
    pub fn from_payload(payload: Value) -> Result<Self, ClientError> {
        let id = payload
            .get("id")
            .and_then(serialized_id)
            .ok_or_else(|| ClientError::Payload("chat without id".to_string()))?;
        Ok(Self {
            id,
            name: opt_str(&payload, "name"),
            is_group: payload
                .get("isGroup")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            raw: payload,
        })
    }
}

/// Contact record resolved for a message sender.
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub id: String,
    pub name: Option<String>,
    pub pushname: Option<String>,
    pub number: Option<String>,
    pub raw: Value,
}

impl ContactInfo {
    pub fn from_payload(payload: Value) -> Result<Self, ClientError> {
        let id = payload
            .get("id")
            .and_then(serialized_id)
            .ok_or_else(|| ClientError::Payload("contact without id".to_string()))?;
        Ok(Self {
            id,
            name: opt_str(&payload, "name"),
            pushname: opt_str(&payload, "pushname"),
            number: opt_str(&payload, "number"),
            raw: payload,
        })
    }
}
