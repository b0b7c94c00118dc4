//! Set of event names this client is subscribed to.
//!
//! The registry is the in-memory truth; the manager keeps the wire in step
//! with it by sending a subscribe envelope for each newly added name while
//! open, and by replaying the whole set after every successful connect.

use std::collections::BTreeSet;

use crate::protocol::PubSubEnvelope;

#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    events: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only when `event` was not already tracked, i.e. when
    /// a subscribe envelope needs to go on the wire.
    pub fn add(&mut self, event: &str) -> bool {
        self.events.insert(event.to_string())
    }

    /// Returns `true` only when `event` was tracked.
    pub fn remove(&mut self, event: &str) -> bool {
        self.events.remove(event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One subscribe envelope per tracked event, in name order.
    pub fn replay(&self) -> Vec<PubSubEnvelope> {
        self.events
            .iter()
            .map(|e| PubSubEnvelope::subscribe(e.as_str()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PubSubKey;

    #[test]
    fn add_is_idempotent() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.add("asr/result"));
        assert!(!reg.add("asr/result"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_reports_whether_tracked() {
        let mut reg = SubscriptionRegistry::new();
        assert!(!reg.remove("asr/error"));
        reg.add("asr/error");
        assert!(reg.remove("asr/error"));
        assert!(reg.is_empty());
    }

    #[test]
    fn replay_emits_one_subscribe_per_event() {
        let mut reg = SubscriptionRegistry::new();
        reg.add("b");
        reg.add("a");
        reg.add("b");

        let envs = reg.replay();
        assert_eq!(envs.len(), 2);
        assert!(envs.iter().all(|e| e.key == PubSubKey::Subscribe));
        let names: Vec<&str> = envs.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
