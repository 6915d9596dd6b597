use anyhow::Result;
use tokio::sync::broadcast;
use tracing::trace;

use super::types::{EventKind, OfflineEvent};

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<OfflineEvent>,
    kinds: Option<Vec<EventKind>>,
}

impl EventSubscriber {
    fn new(receiver: broadcast::Receiver<OfflineEvent>, kinds: Option<Vec<EventKind>>) -> Self {
        Self { receiver, kinds }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<OfflineEvent> {
        loop {
            let event = self.receiver.recv().await?;

            match &self.kinds {
                Some(kinds) if !kinds.contains(&event.kind()) => continue,
                _ => return Ok(event),
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<OfflineEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => match &self.kinds {
                    Some(kinds) if !kinds.contains(&event.kind()) => continue,
                    _ => return Ok(Some(event)),
                },
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Broadcast bus for offline subsystem events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OfflineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers. Having no subscribers is not an
    /// error.
    pub fn publish(&self, event: OfflineEvent) {
        trace!("Publishing event: {:?}", event.kind());
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe to specific event kinds
    pub fn subscribe_to_kinds(&self, kinds: Vec<EventKind>) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(kinds))
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
