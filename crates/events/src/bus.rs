//! Event bus implementation using tokio broadcast channels

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{EventEnvelope, IncidentEvent};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 256;

/// Event bus for publishing and subscribing to incident events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to all subscribers, wrapping it in a fresh
    /// [`EventEnvelope`].
    ///
    /// Returns the number of subscribers that received the event. With no
    /// subscribers the event is dropped and 0 is returned; sinks are
    /// optional.
    pub fn publish(&self, event: IncidentEvent) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        self.sender.send(EventEnvelope::new(event)).unwrap_or(0)
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IncidentEvent;
    use incident_core::NodeId;
    use uuid::Uuid;

    fn cleared() -> IncidentEvent {
        IncidentEvent::AlertCleared {
            incident_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let sent = bus.publish(cleared());
        assert_eq!(sent, 1);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received.event, IncidentEvent::AlertCleared { .. }));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let sent = bus.publish(IncidentEvent::RouteUnreachable {
            incident_id: Uuid::new_v4(),
            source_node: NodeId::from("P9"),
        });
        assert_eq!(sent, 2);

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_no_subscribers_drops_event() {
        let bus = EventBus::new();
        let sent = bus.publish(cleared());
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_event_count() {
        let bus = EventBus::new();
        assert_eq!(bus.event_count(), 0);

        bus.publish(cleared());
        bus.publish(cleared());
        assert_eq!(bus.event_count(), 2);
    }
}
