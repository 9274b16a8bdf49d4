//! Supervisor event broadcasting.
//!
//! Fans every `SupervisorEvent` out to any number of in-process subscribers
//! over a tokio broadcast channel. Transport adapters (stdio bridge, Tauri,
//! SSE) subscribe here and forward events in their own format.

use flotilla_core::{EventSink, SupervisorEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel capacity for supervisor events.
///
/// Log output is bursty; a subscriber that falls further behind than this
/// receives `RecvError::Lagged` and skips ahead.
const CHANNEL_CAPACITY: usize = 4096;

/// Broadcaster for supervisor events.
#[derive(Debug)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event: SupervisorEvent) {
        // Nobody listening is not an error
        if self.sender.receiver_count() > 0 {
            trace!(event = event.event_name(), service = ?event.service(), "Broadcasting event");
            let _ = self.sender.send(event);
        }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBroadcaster {
    fn emit(&self, event: SupervisorEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::ServiceStatus;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        for name in ["a", "b", "c"] {
            broadcaster.emit(SupervisorEvent::status(ServiceStatus::stopped(name)));
        }

        for expected in ["a", "b", "c"] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.service(), Some(expected));
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.broadcast(SupervisorEvent::status(ServiceStatus::stopped("x")));
    }
}
