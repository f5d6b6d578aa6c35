use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed staffing events, keyed by entity id
/// (engineer id for assignment/engineer events, project id for project events).
/// Lets a caller watch one engineer's allocation changes without polling.
pub struct ChangeFeed {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for an entity. Creates the channel if needed.
    pub fn subscribe(&self, entity_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(entity_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn publish(&self, entity_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&entity_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a channel (e.g. when the entity is deleted).
    pub fn remove(&self, entity_id: &Ulid) {
        self.channels.remove(entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = ChangeFeed::new();
        let id = Ulid::new();
        let mut rx = feed.subscribe(id);

        let event = Event::EngineerAdded {
            id,
            name: "Ada".into(),
            max_capacity: 100,
        };
        feed.publish(id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let feed = ChangeFeed::new();
        let id = Ulid::new();
        // No subscriber, should not panic
        feed.publish(id, &Event::EngineerRemoved { id });
    }
}
