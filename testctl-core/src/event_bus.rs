//! In-process publish/subscribe used for inter-component notifications (C1).
//!
//! No durability is required: publication is best-effort and execution
//! correctness never depends on delivery — the direct result path (an
//! executor's return value, a stored [`TestResult`](crate::contracts::TestResult))
//! is always authoritative. A broadcast channel per topic preserves
//! per-topic publication order to any single subscriber; there is no
//! ordering guarantee across topics.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Value> {
        let mut topics = self.topics.lock().expect("event bus topic map poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publishes `payload` on `topic`. Best-effort: if there are no
    /// subscribers the payload is silently dropped, matching the "delivery
    /// is best-effort" contract.
    pub fn publish<T: Serialize>(&self, topic: &str, payload: &T) {
        let sender = self.sender_for(topic);
        match serde_json::to_value(payload) {
            Ok(value) => {
                let _ = sender.send(value);
            }
            Err(err) => {
                trace!(topic, error = %err, "failed to serialize event bus payload");
            }
        }
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        self.sender_for(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe("session.started");
        bus.publish("session.started", &json!({"session_id": "abc"}));
        let received = rx.recv().await.unwrap();
        assert_eq!(received["session_id"], "abc");
    }

    #[tokio::test]
    async fn publication_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish("phase.started", &json!({"phase": "api_probes"}));
    }

    #[tokio::test]
    async fn per_topic_order_is_preserved_for_a_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe("t");
        bus.publish("t", &json!(1));
        bus.publish("t", &json!(2));
        bus.publish("t", &json!(3));
        assert_eq!(rx.recv().await.unwrap(), json!(1));
        assert_eq!(rx.recv().await.unwrap(), json!(2));
        assert_eq!(rx.recv().await.unwrap(), json!(3));
    }
}
