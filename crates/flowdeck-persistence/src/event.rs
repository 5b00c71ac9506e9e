//! Persistence notifications.
//!
//! The debounced save path is fire-and-forget: by the time a commit runs,
//! its original caller has returned. Outcomes are therefore published on a
//! broadcast bus that any number of observers (status bars, toasts, tests)
//! can subscribe to.

use tokio::sync::broadcast;

use crate::error::FailureReport;

/// What the engine announces.
#[derive(Debug, Clone)]
pub enum PersistenceEvent {
    /// A debounced commit reached durable storage.
    SaveCompleted { bytes: usize },

    /// A debounced commit failed. The engine stays operable.
    SaveFailed(FailureReport),

    /// The persisted workspace record was removed.
    StateCleared,
}

/// Broadcast fan-out for [`PersistenceEvent`]s.
///
/// Emitting with no subscribers is fine; slow subscribers may miss events
/// (broadcast semantics), which is acceptable for notifications.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PersistenceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: PersistenceEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.sender.subscribe()
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
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(PersistenceEvent::StateCleared);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(PersistenceEvent::SaveCompleted { bytes: 42 });

        assert!(matches!(
            first.recv().await.unwrap(),
            PersistenceEvent::SaveCompleted { bytes: 42 }
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            PersistenceEvent::SaveCompleted { bytes: 42 }
        ));
    }
}
