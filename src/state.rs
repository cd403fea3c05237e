use crate::events::{EventBus, RelayEvent};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Entity attribute map as published to observers
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Observable snapshot of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub attributes: Attributes,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Latest published state per entity, with change notifications on the bus
pub struct StateStore {
    states: RwLock<HashMap<String, EntityState>>,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            event_bus,
        }
    }

    /// Publish `state` for `entity_id`. `last_changed` only moves when the
    /// state string itself changes.
    pub fn set(&self, entity_id: &str, state: impl Into<String>, attributes: Attributes) -> EntityState {
        let state = state.into();
        let now = Utc::now();

        let (old_state, new_state) = {
            let mut states = self.states.write();
            let old_state = states.get(entity_id).cloned();
            let last_changed = match &old_state {
                Some(old) if old.state == state => old.last_changed,
                _ => now,
            };

            let new_state = EntityState {
                entity_id: entity_id.to_string(),
                state,
                attributes,
                last_changed,
                last_updated: now,
            };
            states.insert(entity_id.to_string(), new_state.clone());
            (old_state, new_state)
        };

        self.event_bus.publish(RelayEvent::StateChanged {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: new_state.clone(),
        });

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.read().get(entity_id).cloned()
    }

    /// All published states, ordered by entity id
    pub fn all(&self) -> Vec<EntityState> {
        let mut states: Vec<EntityState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}
