// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Migration Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// The CLI progress printer and tests subscribe to it; events are not
// persisted.

use crate::domain::events::MigrationEvent;
use crate::domain::migration::RunId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to migration events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MigrationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: MigrationEvent) {
        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to migration event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            run_id: None,
        }
    }

    /// Subscribe to the events of a single run
    pub fn subscribe_run(&self, run_id: RunId) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            run_id: Some(run_id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for migration events, optionally filtered by run
pub struct EventReceiver {
    receiver: broadcast::Receiver<MigrationEvent>,
    run_id: Option<RunId>,
}

impl EventReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<MigrationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<MigrationEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &MigrationEvent) -> bool {
        self.run_id.map_or(true, |id| event.run_id() == id)
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::RunOutcome;
    use crate::domain::migration::MigrationStatus;
    use chrono::Utc;
    use std::path::PathBuf;

    fn finished(run_id: RunId) -> MigrationEvent {
        MigrationEvent::RunFinished {
            run_id,
            outcome: RunOutcome::Completed,
            succeeded: 2,
            failed: 0,
            skipped: 0,
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let run_id = RunId::new();

        event_bus.publish(MigrationEvent::ItemCompleted {
            run_id,
            source_path: PathBuf::from("/src/a.txt"),
            dest_path: PathBuf::from("/dst/a.txt"),
            status: MigrationStatus::Success,
            error_kind: None,
            completed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            MigrationEvent::ItemCompleted { status, .. } => {
                assert_eq!(status, MigrationStatus::Success)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_filter() {
        let event_bus = EventBus::new(10);
        let ours = RunId::new();
        let mut receiver = event_bus.subscribe_run(ours);

        event_bus.publish(finished(RunId::new()));
        event_bus.publish(finished(ours));

        assert_eq!(receiver.recv().await.unwrap().run_id(), ours);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.subscriber_count(), 0);
        event_bus.publish(finished(RunId::new()));
    }
}
