//! EventSink implementations.
//!
//! - `BroadcastEventSink`: fans events out to any number of subscribers
//!   (UI bridge, CLI printer, tests).
//! - `NoopEventSink`: drops everything.

use tokio::sync::broadcast;

use crate::domain::QueueEvent;
use crate::ports::EventSink;

pub struct BroadcastEventSink {
    tx: broadcast::Sender<QueueEvent>,
}

impl BroadcastEventSink {
    /// `capacity` is how many events a slow subscriber may fall behind
    /// before it starts missing them.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: QueueEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("queue event dropped: no subscribers");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: QueueEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, QueueStatus};

    fn update(project: &str) -> QueueEvent {
        QueueEvent::QueueStatusUpdate {
            project_id: ProjectId::new(project),
            status: QueueStatus::default(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let sink = BroadcastEventSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        sink.emit(update("P1"));

        assert_eq!(a.recv().await.unwrap(), update("P1"));
        assert_eq!(b.recv().await.unwrap(), update("P1"));
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        BroadcastEventSink::new(1).emit(update("P1"));
        NoopEventSink.emit(update("P1"));
    }
}
