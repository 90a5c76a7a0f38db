//! Change-notification events for catalog records
//!
//! Every committed create/update/delete on a catalog record is announced on
//! the [`EventBus`] so interested subscribers (response cache, search
//! indexer, marketing publisher) can react. The pipeline driver suppresses
//! emission for the duration of a bulk ingest and re-enables it afterwards,
//! so a full refresh produces a single coherent invalidation instead of one
//! per row.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of catalog record an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Organization,
    Course,
    CourseRun,
    Seat,
    CourseEntitlement,
    Program,
    Curriculum,
    Pathway,
    Image,
    Video,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Organization => "organization",
            RecordKind::Course => "course",
            RecordKind::CourseRun => "course_run",
            RecordKind::Seat => "seat",
            RecordKind::CourseEntitlement => "course_entitlement",
            RecordKind::Program => "program",
            RecordKind::Curriculum => "curriculum",
            RecordKind::Pathway => "pathway",
            RecordKind::Image => "image",
            RecordKind::Video => "video",
        }
    }
}

/// What happened to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// A single record-change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub kind: RecordKind,
    pub id: Uuid,
    pub action: ChangeAction,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CatalogEvent {
    pub fn new(kind: RecordKind, id: Uuid, action: ChangeAction) -> Self {
        Self {
            kind,
            id,
            action,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Central event distribution bus for record-change events
///
/// Built on `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
///
/// The `connected` gate implements the ingest-time disconnect described in
/// the pipeline driver: while disconnected, emits are dropped on the floor.
/// Delivery is at-least-once and never rolls back the commit that produced
/// the event; a lagged subscriber only loses events, it cannot fail them.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
    connected: Arc<AtomicBool>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            capacity,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring missing subscribers and the suppression gate
    /// outcome
    ///
    /// While the bus is disconnected (bulk ingest in flight) the event is
    /// silently dropped.
    pub fn emit_lossy(&self, event: CatalogEvent) {
        if !self.is_connected() {
            return;
        }
        let _ = self.tx.send(event);
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or `None` when the event was suppressed
    /// or nobody was listening.
    pub fn emit(&self, event: CatalogEvent) -> Option<usize> {
        if !self.is_connected() {
            return None;
        }
        self.tx.send(event).ok()
    }

    /// Suppress emission for the duration of a bulk ingest
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::debug!("Event bus disconnected for bulk ingest");
    }

    /// Re-enable emission after a bulk ingest
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Event bus reconnected");
    }

    /// Whether emission is currently enabled
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_to_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let id = Uuid::new_v4();
        bus.emit_lossy(CatalogEvent::new(
            RecordKind::Course,
            id,
            ChangeAction::Created,
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, RecordKind::Course);
        assert_eq!(event.id, id);
        assert_eq!(event.action, ChangeAction::Created);
    }

    #[tokio::test]
    async fn disconnect_suppresses_emission() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.disconnect();
        bus.emit_lossy(CatalogEvent::new(
            RecordKind::CourseRun,
            Uuid::new_v4(),
            ChangeAction::Updated,
        ));
        assert!(rx.try_recv().is_err());

        bus.reconnect();
        bus.emit_lossy(CatalogEvent::new(
            RecordKind::CourseRun,
            Uuid::new_v4(),
            ChangeAction::Updated,
        ));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn emit_reports_suppression() {
        let bus = EventBus::new(4);
        let _rx = bus.subscribe();

        bus.disconnect();
        let sent = bus.emit(CatalogEvent::new(
            RecordKind::Program,
            Uuid::new_v4(),
            ChangeAction::Deleted,
        ));
        assert!(sent.is_none());
    }
}
