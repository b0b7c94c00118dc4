//! Recognition of inbound ASR events.
//!
//! The service publishes `asr/result`, `asr/sentence_begin`,
//! `asr/sentence_end` and `asr/error`, optionally prefixed with the client's
//! namespace.  Anything else is not an ASR event.

use serde_json::Value;

use crate::protocol::{Inbound, PubSubKey};

pub const EVENT_RESULT: &str = "asr/result";
pub const EVENT_SENTENCE_BEGIN: &str = "asr/sentence_begin";
pub const EVENT_SENTENCE_END: &str = "asr/sentence_end";
pub const EVENT_ERROR: &str = "asr/error";

/// Every event name the session consumes, for subscription.
pub const CONSUMED_EVENTS: [&str; 4] = [
    EVENT_RESULT,
    EVENT_SENTENCE_BEGIN,
    EVENT_SENTENCE_END,
    EVENT_ERROR,
];

#[derive(Debug, Clone, PartialEq)]
pub enum AsrEvent {
    /// `text` replaces the accumulated transcript, `delta` extends it.
    Partial {
        text: Option<String>,
        delta: Option<String>,
    },
    SpeechStarted,
    Completed { text: Option<String> },
    Error { message: String },
}

impl AsrEvent {
    /// Classify an inbound envelope.  Returns `None` for non-ASR traffic.
    pub fn from_inbound(inbound: &Inbound, namespace: &str) -> Option<Self> {
        match inbound {
            Inbound::PubSub(env) if env.key == PubSubKey::Publish => {
                Self::from_event(&env.event, env.body(), namespace)
            }
            _ => None,
        }
    }

    pub fn from_event(event: &str, body: Option<&Value>, namespace: &str) -> Option<Self> {
        let name = strip_namespace(event, namespace);
        match name {
            EVENT_RESULT => Some(AsrEvent::Partial {
                text: field(body, "text"),
                delta: field(body, "delta"),
            }),
            EVENT_SENTENCE_BEGIN => Some(AsrEvent::SpeechStarted),
            EVENT_SENTENCE_END => Some(AsrEvent::Completed {
                text: field(body, "text"),
            }),
            EVENT_ERROR => Some(AsrEvent::Error {
                message: field(body, "message")
                    .or_else(|| field(body, "error"))
                    .unwrap_or_else(|| "unspecified ASR error".into()),
            }),
            _ => None,
        }
    }
}

fn strip_namespace<'a>(event: &'a str, namespace: &str) -> &'a str {
    if namespace.is_empty() {
        return event;
    }
    event
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(event)
}

/// A bare string body counts as the `text`/`message` field.
fn field(body: Option<&Value>, key: &str) -> Option<String> {
    match body? {
        Value::String(s) if key == "text" || key == "message" => Some(s.clone()),
        Value::Object(map) => map.get(key).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, PubSubEnvelope};
    use serde_json::json;

    #[test]
    fn result_with_text_and_delta() {
        let body = json!({"text": "hello wor", "delta": "wor"});
        assert_eq!(
            AsrEvent::from_event("asr/result", Some(&body), "voice"),
            Some(AsrEvent::Partial {
                text: Some("hello wor".into()),
                delta: Some("wor".into())
            })
        );
    }

    #[test]
    fn namespace_prefix_is_accepted() {
        assert_eq!(
            AsrEvent::from_event("voice/asr/sentence_begin", None, "voice"),
            Some(AsrEvent::SpeechStarted)
        );
        assert_eq!(AsrEvent::from_event("other/asr/sentence_begin", None, "voice"), None);
    }

    #[test]
    fn error_message_falls_back() {
        assert_eq!(
            AsrEvent::from_event("asr/error", Some(&json!({"error": "quota"})), ""),
            Some(AsrEvent::Error {
                message: "quota".into()
            })
        );
        assert_eq!(
            AsrEvent::from_event("asr/error", None, ""),
            Some(AsrEvent::Error {
                message: "unspecified ASR error".into()
            })
        );
    }

    #[test]
    fn string_body_is_the_final_text() {
        assert_eq!(
            AsrEvent::from_event("asr/sentence_end", Some(&json!("done")), ""),
            Some(AsrEvent::Completed {
                text: Some("done".into())
            })
        );
    }

    #[test]
    fn only_publishes_are_classified() {
        let sub = Inbound::PubSub(PubSubEnvelope::subscribe("asr/result"));
        assert_eq!(AsrEvent::from_inbound(&sub, ""), None);

        let publish = decode(r#"{"key":"publish","event":"asr/sentence_end","payload":[{"text":"hi"}]}"#);
        assert_eq!(
            AsrEvent::from_inbound(&publish, ""),
            Some(AsrEvent::Completed {
                text: Some("hi".into())
            })
        );
    }

    #[test]
    fn unrelated_event_is_none() {
        assert_eq!(AsrEvent::from_event("chat/response", None, ""), None);
    }
}
