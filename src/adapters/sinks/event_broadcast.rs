//! Broadcast fan-out of orchestrator events with sequence numbering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::domain::ports::{EventSink, OrchestratorEvent};

/// An event stamped with its publish order.
#[derive(Debug, Clone, Serialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: OrchestratorEvent,
}

/// Event sink backed by a `tokio::sync::broadcast` channel.
///
/// Emitting never blocks; slow subscribers lag and lose the oldest events.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<SequencedEvent>,
    sequence: AtomicU64,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: OrchestratorEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(sequence, event = event.name(), "Emitting event");
        // No subscribers is fine.
        let _ = self.sender.send(SequencedEvent {
            sequence,
            emitted_at: Utc::now(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;

    #[tokio::test]
    async fn test_events_arrive_in_sequence() {
        let sink = BroadcastEventSink::default();
        let mut rx = sink.subscribe();

        sink.emit(OrchestratorEvent::TaskUpdate(Box::new(Task::new("one"))));
        sink.emit(OrchestratorEvent::TaskUpdate(Box::new(Task::new("two"))));

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.event.name(), "task_update");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let sink = BroadcastEventSink::new(4);
        sink.emit(OrchestratorEvent::TaskUpdate(Box::new(Task::new("lonely"))));
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let event = SequencedEvent {
            sequence: 7,
            emitted_at: Utc::now(),
            event: OrchestratorEvent::TaskUpdate(Box::new(Task::new("shape"))),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task_update");
        assert_eq!(json["payload"]["title"], "shape");
        assert_eq!(json["sequence"], 7);
    }
}
