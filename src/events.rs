use crate::state::EntityState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Events that can occur in the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayEvent {
    /// An entity published a new state or new attributes
    StateChanged {
        entity_id: String,
        old_state: Option<EntityState>,
        new_state: EntityState,
    },
    /// A client opened an MJPEG session
    StreamStarted { entity_id: String, session_id: String },
    /// An MJPEG session ended, for whatever reason
    StreamEnded {
        entity_id: String,
        session_id: String,
        frames: u64,
        bytes: u64,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
}

impl RelayEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            RelayEvent::StateChanged {
                entity_id,
                new_state,
                ..
            } => format!("{} -> {}", entity_id, new_state.state),
            RelayEvent::StreamStarted {
                entity_id,
                session_id,
            } => format!("Stream {} started on {}", session_id, entity_id),
            RelayEvent::StreamEnded {
                entity_id,
                session_id,
                frames,
                bytes,
            } => format!(
                "Stream {} on {} ended after {} frames ({} bytes)",
                session_id, entity_id, frames, bytes
            ),
            RelayEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            RelayEvent::StateChanged { .. } => "state_changed",
            RelayEvent::StreamStarted { .. } => "stream_started",
            RelayEvent::StreamEnded { .. } => "stream_ended",
            RelayEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Broadcast bus carrying state changes to observers
pub struct EventBus {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it.
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: RelayEvent) -> usize {
        match &event {
            RelayEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            RelayEvent::StreamStarted { .. } | RelayEvent::StreamEnded { .. } => {
                info!("{}", event.description());
            }
            RelayEvent::StateChanged { .. } => {
                debug!("{}", event.description());
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
