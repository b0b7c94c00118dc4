//! [`ChatDispatcher`]: final transcripts in, chat requests out.
//!
//! ```text
//! on_transcript("turn on the light")
//!   ├─ history += user turn
//!   ├─ publish <ns>/chat/request [{"text": ..., "history": [last N turns]}]
//!   └─ turns_tx ← user turn
//!
//! inbound chat/response  ──▶ on_inbound() ──▶ history += assistant turn
//!                                             turns_tx ← assistant turn
//! ```

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::ChatConfig;
use crate::protocol::{Inbound, PubSubKey};
use crate::transport::Outbox;

use super::{ConversationHistory, ConversationTurn};

/// Legacy typed frame carrying an assistant reply.
pub const LEGACY_RESPONSE_TYPE: &str = "chat_response";

pub struct ChatDispatcher {
    outbox: Arc<dyn Outbox>,
    history: ConversationHistory,
    request_event: String,
    response_event: String,
    namespace: String,
    turns_tx: mpsc::UnboundedSender<ConversationTurn>,
}

impl ChatDispatcher {
    /// `turns_tx` receives every recorded turn, user and assistant.
    pub fn new(
        outbox: Arc<dyn Outbox>,
        config: &ChatConfig,
        namespace: &str,
        turns_tx: mpsc::UnboundedSender<ConversationTurn>,
    ) -> Self {
        let request_event = if namespace.is_empty() {
            config.request_event.clone()
        } else {
            format!("{namespace}/{}", config.request_event)
        };
        Self {
            outbox,
            history: ConversationHistory::new(config.history_turns),
            request_event,
            response_event: config.response_event.clone(),
            namespace: namespace.to_string(),
            turns_tx,
        }
    }

    pub fn response_event(&self) -> &str {
        &self.response_event
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Send `text` as a chat request.  Empty or whitespace-only text is
    /// ignored.  Returns whether a request was sent.
    pub fn on_transcript(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            log::info!("chat: empty transcript, nothing to send");
            return false;
        }

        let context = self.history.turns();
        let turn = ConversationTurn::user(text);
        self.history.push(turn.clone());
        self.outbox.publish(
            &self.request_event,
            vec![json!({ "text": text, "history": context })],
        );
        log::info!("chat: request sent ({} chars, {} turns of history)", text.len(), context.len());
        let _ = self.turns_tx.send(turn);
        true
    }

    /// Record an assistant reply.  The hook for whatever routes responses.
    pub fn record_assistant(&mut self, text: &str) -> Option<ConversationTurn> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let turn = ConversationTurn::assistant(text);
        self.history.push(turn.clone());
        let _ = self.turns_tx.send(turn.clone());
        Some(turn)
    }

    /// Consume `inbound` if it is an assistant reply.  Returns `false` for
    /// anything else.
    pub fn on_inbound(&mut self, inbound: &Inbound) -> bool {
        let reply = match inbound {
            Inbound::PubSub(env) if env.key == PubSubKey::Publish && self.is_response(&env.event) => {
                env.body().and_then(reply_text)
            }
            Inbound::LegacyTyped { kind, body } if kind == LEGACY_RESPONSE_TYPE => reply_text(body),
            _ => return false,
        };
        match reply {
            Some(text) => {
                self.record_assistant(&text);
            }
            None => log::warn!("chat: response without text"),
        }
        true
    }

    fn is_response(&self, event: &str) -> bool {
        if event == self.response_event {
            return true;
        }
        event
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| rest == self.response_event)
    }
}

fn reply_text(body: &Value) -> Option<String> {
    match body {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["text", "content", "message"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chat::Role;
    use crate::protocol::decode;

    #[derive(Default)]
    pub(crate) struct RecordingOutbox {
        pub published: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl Outbox for RecordingOutbox {
        fn publish(&self, event: &str, payload: Vec<Value>) {
            self.published
                .lock()
                .unwrap()
                .push((event.to_string(), payload));
        }
    }

    fn dispatcher() -> (
        ChatDispatcher,
        Arc<RecordingOutbox>,
        mpsc::UnboundedReceiver<ConversationTurn>,
    ) {
        let outbox = Arc::new(RecordingOutbox::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let d = ChatDispatcher::new(outbox.clone(), &ChatConfig::default(), "voice", tx);
        (d, outbox, rx)
    }

    #[test]
    fn whitespace_transcript_is_ignored() {
        let (mut d, outbox, mut turns) = dispatcher();
        assert!(!d.on_transcript("   \n"));
        assert!(outbox.published.lock().unwrap().is_empty());
        assert!(turns.try_recv().is_err());
    }

    #[test]
    fn transcript_publishes_request_with_prior_history() {
        let (mut d, outbox, mut turns) = dispatcher();
        d.on_transcript("first");
        d.record_assistant("reply");
        assert!(d.on_transcript("  second "));

        let published = outbox.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        let (event, payload) = &published[1];
        assert_eq!(event, "voice/chat/request");
        assert_eq!(
            payload[0],
            json!({
                "text": "second",
                "history": [
                    {"role": "user", "content": "first"},
                    {"role": "assistant", "content": "reply"}
                ]
            })
        );

        let roles: Vec<Role> = std::iter::from_fn(|| turns.try_recv().ok())
            .map(|t| t.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn request_history_is_capped_at_ten_turns() {
        let (mut d, outbox, _turns) = dispatcher();
        for i in 0..15 {
            d.on_transcript(&format!("t{i}"));
        }
        let published = outbox.published.lock().unwrap();
        let history = published.last().unwrap().1[0]["history"].as_array().unwrap().clone();
        assert_eq!(history.len(), 10);
        assert_eq!(history[9]["content"], json!("t13"));
        assert_eq!(d.history().len(), 10);
    }

    #[test]
    fn response_event_records_assistant_turn() {
        let (mut d, _outbox, mut turns) = dispatcher();
        let inbound = decode(r#"{"key":"publish","event":"chat/response","payload":[{"text":"hello"}]}"#);
        assert!(d.on_inbound(&inbound));
        assert_eq!(turns.try_recv().unwrap(), ConversationTurn::assistant("hello"));
    }

    #[test]
    fn namespaced_and_legacy_responses_are_recognised() {
        let (mut d, _outbox, _turns) = dispatcher();
        let namespaced =
            decode(r#"{"key":"publish","event":"voice/chat/response","payload":["hi"]}"#);
        assert!(d.on_inbound(&namespaced));

        let legacy = Inbound::LegacyTyped {
            kind: LEGACY_RESPONSE_TYPE.into(),
            body: json!({"content": "legacy"}),
        };
        assert!(d.on_inbound(&legacy));
        assert_eq!(d.history().last().unwrap().content, "legacy");
    }

    #[test]
    fn unrelated_inbound_is_not_consumed() {
        let (mut d, _outbox, _turns) = dispatcher();
        let other = decode(r#"{"key":"publish","event":"asr/result","payload":[]}"#);
        assert!(!d.on_inbound(&other));
        assert!(d.history().is_empty());
    }
}
