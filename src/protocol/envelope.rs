//! Wire envelopes and the decode/encode functions for them.
//!
//! Three message families share the connection:
//!
//! | Family    | Shape                                                       |
//! |-----------|-------------------------------------------------------------|
//! | Heartbeat | bare `ping` / `pong` text, or `{"key":"ping"}` JSON          |
//! | Pub/Sub   | `{"key": …, "event": …, "payload": [ … ]}`, ack `{"ok":1,…}` |
//! | RPC       | `{"protocol":"mcp","action":"jsonrpc","payload":{…}}`       |
//!
//! Older servers also emit `{"type": …}` objects; those decode to
//! [`Inbound::LegacyTyped`] and are passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal heartbeat frames.
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// `protocol` and `action` values of every RPC envelope.
pub const RPC_PROTOCOL: &str = "mcp";
pub const RPC_ACTION: &str = "jsonrpc";
pub const JSONRPC_VERSION: &str = "2.0";

/// `direction` value carried by replies this client sends.
pub const DIRECTION_OUTBOUND: &str = "outbound";

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    Ping,
    Pong,
}

impl Heartbeat {
    /// The heartbeat that answers this one, if any.
    pub fn reply(self) -> Option<Heartbeat> {
        match self {
            Heartbeat::Ping => Some(Heartbeat::Pong),
            Heartbeat::Pong => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pub/Sub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubSubKey {
    Subscribe,
    Unsubscribe,
    Publish,
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubEnvelope {
    pub key: PubSubKey,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl PubSubEnvelope {
    pub fn subscribe(event: impl Into<String>) -> Self {
        Self {
            key: PubSubKey::Subscribe,
            event: event.into(),
            payload: Vec::new(),
        }
    }

    pub fn unsubscribe(event: impl Into<String>) -> Self {
        Self {
            key: PubSubKey::Unsubscribe,
            event: event.into(),
            payload: Vec::new(),
        }
    }

    pub fn publish(event: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            key: PubSubKey::Publish,
            event: event.into(),
            payload,
        }
    }

    /// First payload element, which is where every event the core consumes
    /// carries its body.
    pub fn body(&self) -> Option<&Value> {
        self.payload.first()
    }
}

// ---------------------------------------------------------------------------
// RPC
// ---------------------------------------------------------------------------

/// JSON-RPC error object carried by a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// The JSON-RPC 2.0 body of an [`RpcEnvelope`].
///
/// Requests carry `method`/`params`; replies carry `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpc {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub protocol: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub payload: JsonRpc,
}

impl RpcEnvelope {
    /// Build a request with correlation id `id`.
    pub fn request(id: &str, method: &str, params: Value) -> Self {
        Self {
            protocol: RPC_PROTOCOL.into(),
            action: RPC_ACTION.into(),
            direction: None,
            payload: JsonRpc {
                jsonrpc: JSONRPC_VERSION.into(),
                id: Some(Value::String(id.into())),
                method: Some(method.into()),
                params: Some(params),
                result: None,
                error: None,
            },
        }
    }

    /// Build a reply to a server-initiated request.
    pub fn reply(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            protocol: RPC_PROTOCOL.into(),
            action: RPC_ACTION.into(),
            direction: Some(DIRECTION_OUTBOUND.into()),
            payload: JsonRpc {
                jsonrpc: JSONRPC_VERSION.into(),
                id: Some(id),
                method: None,
                params: None,
                result,
                error,
            },
        }
    }

    /// `true` when this envelope answers a request rather than making one.
    ///
    /// Keyed on the id alone: serde reads `"result": null` as `None`, and a
    /// null result is a valid reply.
    pub fn is_reply(&self) -> bool {
        self.payload.method.is_none() && self.payload.id.is_some()
    }

    /// The correlation id normalised to a string (`"7"` and `7` match).
    pub fn correlation_id(&self) -> Option<String> {
        match self.payload.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound / Outbound
// ---------------------------------------------------------------------------

/// Result of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `json` records which form the peer used so the reply can match it.
    Heartbeat { beat: Heartbeat, json: bool },
    PubSub(PubSubEnvelope),
    /// Acknowledgement `{"ok": 1, "event": …}`.
    Ack { event: String },
    Rpc(RpcEnvelope),
    LegacyTyped { kind: String, body: Value },
    Unrecognized(String),
}

/// A message this client puts on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Heartbeat { beat: Heartbeat, json: bool },
    PubSub(PubSubEnvelope),
    Rpc(RpcEnvelope),
}

impl Outbound {
    /// Serialise to the text frame sent on the connection.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Outbound::Heartbeat { beat, json: false } => Ok(match beat {
                Heartbeat::Ping => PING.to_string(),
                Heartbeat::Pong => PONG.to_string(),
            }),
            Outbound::Heartbeat { beat, json: true } => {
                let key = match beat {
                    Heartbeat::Ping => PubSubKey::Ping,
                    Heartbeat::Pong => PubSubKey::Pong,
                };
                serde_json::to_string(&serde_json::json!({ "key": key }))
            }
            Outbound::PubSub(env) => serde_json::to_string(env),
            Outbound::Rpc(env) => serde_json::to_string(env),
        }
    }

    /// Short label used in log lines.
    pub fn describe(&self) -> String {
        match self {
            Outbound::Heartbeat { beat, .. } => format!("heartbeat {beat:?}"),
            Outbound::PubSub(env) => format!("{:?} {}", env.key, env.event),
            Outbound::Rpc(env) => match &env.payload.method {
                Some(m) => format!("rpc {m}"),
                None => "rpc reply".to_string(),
            },
        }
    }
}

impl From<PubSubEnvelope> for Outbound {
    fn from(env: PubSubEnvelope) -> Self {
        Outbound::PubSub(env)
    }
}

impl From<RpcEnvelope> for Outbound {
    fn from(env: RpcEnvelope) -> Self {
        Outbound::Rpc(env)
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Decode one raw text frame.
///
/// Never fails: anything that is not a known envelope comes back as
/// [`Inbound::Unrecognized`] and is logged at debug level.
///
/// ```
/// use edge_voice_client::protocol::{decode, Heartbeat, Inbound};
///
/// assert_eq!(
///     decode("ping"),
///     Inbound::Heartbeat { beat: Heartbeat::Ping, json: false }
/// );
/// assert!(matches!(decode("{not json"), Inbound::Unrecognized(_)));
/// ```
pub fn decode(raw: &str) -> Inbound {
    let trimmed = raw.trim();

    // Heartbeats are not JSON and must be checked first.
    match trimmed {
        PING => {
            return Inbound::Heartbeat {
                beat: Heartbeat::Ping,
                json: false,
            }
        }
        PONG => {
            return Inbound::Heartbeat {
                beat: Heartbeat::Pong,
                json: false,
            }
        }
        _ => {}
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("protocol: non-JSON frame dropped ({e}): {}", preview(trimmed));
            return Inbound::Unrecognized(raw.to_string());
        }
    };

    let decoded = decode_value(value);
    if decoded.is_none() {
        log::debug!("protocol: unrecognized envelope: {}", preview(trimmed));
    }
    decoded.unwrap_or_else(|| Inbound::Unrecognized(raw.to_string()))
}

fn decode_value(value: Value) -> Option<Inbound> {
    let obj = value.as_object()?;

    if obj.get("protocol").and_then(Value::as_str) == Some(RPC_PROTOCOL) {
        if obj.get("action").and_then(Value::as_str) != Some(RPC_ACTION) {
            return None;
        }
        return serde_json::from_value(value).ok().map(Inbound::Rpc);
    }

    if obj.contains_key("ok") {
        let event = obj.get("event").and_then(Value::as_str)?;
        return Some(Inbound::Ack {
            event: event.to_string(),
        });
    }

    if obj.contains_key("key") {
        let env: PubSubEnvelope = serde_json::from_value(value).ok()?;
        return Some(match env.key {
            PubSubKey::Ping => Inbound::Heartbeat {
                beat: Heartbeat::Ping,
                json: true,
            },
            PubSubKey::Pong => Inbound::Heartbeat {
                beat: Heartbeat::Pong,
                json: true,
            },
            _ => Inbound::PubSub(env),
        });
    }

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        return Some(Inbound::LegacyTyped {
            kind: kind.to_string(),
            body: value.clone(),
        });
    }

    // Bare `{"event": …, "payload": …}` is a publish without the key field.
    if let Some(event) = obj.get("event").and_then(Value::as_str) {
        let payload = match obj.get("payload") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        return Some(Inbound::PubSub(PubSubEnvelope::publish(event, payload)));
    }

    None
}

fn preview(s: &str) -> &str {
    match s.char_indices().nth(120) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---- Heartbeat ---

    #[test]
    fn bare_ping_and_pong_are_heartbeats() {
        assert_eq!(
            decode("ping"),
            Inbound::Heartbeat {
                beat: Heartbeat::Ping,
                json: false
            }
        );
        assert_eq!(
            decode(" pong\n"),
            Inbound::Heartbeat {
                beat: Heartbeat::Pong,
                json: false
            }
        );
    }

    #[test]
    fn json_ping_is_a_heartbeat() {
        assert_eq!(
            decode(r#"{"key":"ping"}"#),
            Inbound::Heartbeat {
                beat: Heartbeat::Ping,
                json: true
            }
        );
    }

    #[test]
    fn heartbeat_encodes_in_the_requested_form() {
        let text = Outbound::Heartbeat {
            beat: Heartbeat::Ping,
            json: false,
        };
        assert_eq!(text.encode().unwrap(), "ping");

        let json_pong = Outbound::Heartbeat {
            beat: Heartbeat::Pong,
            json: true,
        };
        let v: Value = serde_json::from_str(&json_pong.encode().unwrap()).unwrap();
        assert_eq!(v, json!({"key": "pong"}));
    }

    // ---- Pub/Sub ---

    #[test]
    fn publish_envelope_decodes() {
        let raw = r#"{"key":"publish","event":"asr/result","payload":[{"text":"hi"}]}"#;
        match decode(raw) {
            Inbound::PubSub(env) => {
                assert_eq!(env.key, PubSubKey::Publish);
                assert_eq!(env.event, "asr/result");
                assert_eq!(env.body(), Some(&json!({"text": "hi"})));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn event_without_key_is_treated_as_publish() {
        match decode(r#"{"event":"asr/sentence_end","payload":{"text":"done"}}"#) {
            Inbound::PubSub(env) => {
                assert_eq!(env.key, PubSubKey::Publish);
                assert_eq!(env.payload, vec![json!({"text": "done"})]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ack_decodes() {
        assert_eq!(
            decode(r#"{"ok":1,"event":"asr/result"}"#),
            Inbound::Ack {
                event: "asr/result".into()
            }
        );
    }

    #[test]
    fn subscribe_envelope_wire_shape() {
        let text = Outbound::from(PubSubEnvelope::subscribe("asr/result"))
            .encode()
            .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            v,
            json!({"key": "subscribe", "event": "asr/result", "payload": []})
        );
    }

    #[test]
    fn unknown_pubsub_key_is_unrecognized() {
        assert!(matches!(
            decode(r#"{"key":"explode","event":"x"}"#),
            Inbound::Unrecognized(_)
        ));
    }

    // ---- RPC ---

    #[test]
    fn rpc_request_wire_shape() {
        let env = RpcEnvelope::request("7", "asr.start", json!({"language": "en"}));
        let v: Value = serde_json::from_str(&Outbound::from(env).encode().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "protocol": "mcp",
                "action": "jsonrpc",
                "payload": {
                    "jsonrpc": "2.0",
                    "id": "7",
                    "method": "asr.start",
                    "params": {"language": "en"}
                }
            })
        );
    }

    #[test]
    fn rpc_reply_with_numeric_id_correlates() {
        let raw = r#"{"protocol":"mcp","action":"jsonrpc","direction":"outbound",
                      "payload":{"jsonrpc":"2.0","id":7,"result":{"ok":true}}}"#;
        match decode(raw) {
            Inbound::Rpc(env) => {
                assert!(env.is_reply());
                assert_eq!(env.correlation_id().as_deref(), Some("7"));
                assert_eq!(env.direction.as_deref(), Some("outbound"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rpc_error_reply_decodes() {
        let raw = r#"{"protocol":"mcp","action":"jsonrpc",
                      "payload":{"jsonrpc":"2.0","id":"3","error":{"code":-32601,"message":"nope"}}}"#;
        match decode(raw) {
            Inbound::Rpc(env) => {
                assert!(env.is_reply());
                assert_eq!(
                    env.payload.error,
                    Some(RpcError {
                        code: -32601,
                        message: "nope".into()
                    })
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rpc_reply_with_null_result_is_a_reply() {
        let raw = r#"{"protocol":"mcp","action":"jsonrpc","direction":"outbound",
                      "payload":{"jsonrpc":"2.0","id":"4","result":null}}"#;
        match decode(raw) {
            Inbound::Rpc(env) => {
                assert!(env.is_reply());
                assert_eq!(env.payload.result, None);
                assert_eq!(env.correlation_id().as_deref(), Some("4"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_request_is_not_a_reply() {
        let raw = r#"{"protocol":"mcp","action":"jsonrpc",
                      "payload":{"jsonrpc":"2.0","id":1,"method":"tools/list"}}"#;
        match decode(raw) {
            Inbound::Rpc(env) => assert!(!env.is_reply()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_reply_carries_direction() {
        let env = RpcEnvelope::reply(json!(1), Ok(json!({"tools": []})));
        assert_eq!(env.direction.as_deref(), Some(DIRECTION_OUTBOUND));
        assert!(env.is_reply());
    }

    // ---- Legacy / garbage ---

    #[test]
    fn typed_object_is_legacy() {
        match decode(r#"{"type":"chat_response","text":"hello"}"#) {
            Inbound::LegacyTyped { kind, body } => {
                assert_eq!(kind, "chat_response");
                assert_eq!(body["text"], "hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_input_never_panics() {
        for raw in ["", "{", "[]", "42", "null", r#"{"protocol":"mcp"}"#, "\u{0}"] {
            assert!(matches!(decode(raw), Inbound::Unrecognized(_)), "{raw:?}");
        }
    }
}
