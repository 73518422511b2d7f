// src/events.rs
//
// In-process fan-out for realtime updates. Message and notification inserts
// publish here; /api/v1/events streams the caller's slice over SSE. Delivery
// is best-effort: a receiver that lags past the channel capacity misses
// events and catches up on its next fetch.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreated,
    NotificationCreated,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppEvent {
    /// Recipient; the stream for any other user filters this event out.
    pub user_id: Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let user = Uuid::new_v4();

        bus.publish(AppEvent {
            user_id: user,
            kind: EventKind::MessageCreated,
            payload: serde_json::json!({"conversation_id": "x"}),
        });

        let got = rx.recv().await.unwrap();
        assert_eq!(got.user_id, user);
        assert_eq!(got.kind, EventKind::MessageCreated);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(AppEvent {
            user_id: Uuid::new_v4(),
            kind: EventKind::NotificationCreated,
            payload: serde_json::Value::Null,
        });
    }

    #[test]
    fn event_kind_wire_form() {
        let json = serde_json::to_string(&EventKind::NotificationCreated).unwrap();
        assert_eq!(json, "\"notification_created\"");
    }
}
