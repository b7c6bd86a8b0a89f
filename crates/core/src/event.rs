//! Domain event system — decoupled notification between the controller and
//! whatever surface renders transcripts.
//!
//! The turn controller and chamber manager publish events; the HTTP gateway
//! forwards them to every open tab of the affected user so those tabs
//! re-read the store instead of trusting stale caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::consultation::{ChamberId, Role};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A turn was durably appended
    TurnRecorded {
        email: String,
        chamber_id: ChamberId,
        seq: i64,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// A submission finished; views of this chamber should re-read the store
    TranscriptChanged {
        email: String,
        chamber_id: ChamberId,
        timestamp: DateTime<Utc>,
    },

    /// A chamber and its turns were removed
    ChamberDeleted {
        email: String,
        chamber_id: ChamberId,
        timestamp: DateTime<Utc>,
    },

    /// The inference gateway failed for a submission
    InferenceFailed {
        email: String,
        chamber_id: ChamberId,
        kind: String,
        operator_actionable: bool,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// The user the event concerns. Subscribers filter on this.
    pub fn email(&self) -> &str {
        match self {
            DomainEvent::TurnRecorded { email, .. }
            | DomainEvent::TranscriptChanged { email, .. }
            | DomainEvent::ChamberDeleted { email, .. }
            | DomainEvent::InferenceFailed { email, .. } => email,
        }
    }

    /// Event name used on the SSE wire.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TurnRecorded { .. } => "turn_recorded",
            DomainEvent::TranscriptChanged { .. } => "transcript_changed",
            DomainEvent::ChamberDeleted { .. } => "chamber_deleted",
            DomainEvent::InferenceFailed { .. } => "inference_failed",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::TranscriptChanged {
            email: "a@x".into(),
            chamber_id: ChamberId(7),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.email(), "a@x");
        match event.as_ref() {
            DomainEvent::TranscriptChanged { chamber_id, .. } => {
                assert_eq!(*chamber_id, ChamberId(7));
            }
            _ => panic!("Expected TranscriptChanged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ChamberDeleted {
            email: "a@x".into(),
            chamber_id: ChamberId(1),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = DomainEvent::InferenceFailed {
            email: "a@x".into(),
            chamber_id: ChamberId(2),
            kind: "timeout".into(),
            operator_actionable: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"inference_failed\""));
        assert_eq!(event.name(), "inference_failed");
    }
}
