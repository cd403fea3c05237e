//! Polled vendor devices: download-manager sensors and home-controller switches.

mod sabnzbd;
mod vera;
#[cfg(test)]
mod tests;

pub use sabnzbd::{SabnzbdApi, SabnzbdSensor, SensorKind};
pub use vera::{
    VeraController, VeraDevice, VeraDeviceKind, VeraSwitch, HA_DEVICE_SERVICE,
    SECURITY_SENSOR_SERVICE, SWITCH_POWER_SERVICE,
};

use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::state::{Attributes, EntityState, StateStore};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Published state of a sensor whose last poll failed
pub const STATE_UNKNOWN: &str = "unknown";

/// A vendor value read on every refresh
#[async_trait]
pub trait PollableMetric: Send + Sync {
    fn entity_id(&self) -> &str;

    fn name(&self) -> &str;

    fn unit_of_measurement(&self) -> &str;

    /// Read the current value from the vendor API
    async fn poll(&self) -> Result<String>;
}

/// A vendor switch that can be commanded and polled
#[async_trait]
pub trait ToggleableSwitch: Send + Sync {
    fn entity_id(&self) -> &str;

    fn name(&self) -> &str;

    /// Last known state, local or polled
    fn is_on(&self) -> bool;

    async fn turn_on(&self) -> Result<()>;

    async fn turn_off(&self) -> Result<()>;

    /// Reconcile the local state with the vendor's status
    async fn update(&self) -> Result<()>;

    fn attributes(&self) -> Attributes {
        Attributes::new()
    }
}

/// Poll one sensor and publish its value, or `unknown` for this cycle
pub async fn refresh_sensor(sensor: &dyn PollableMetric, store: &StateStore) -> EntityState {
    let state = match sensor.poll().await {
        Ok(value) => value,
        Err(e) => {
            warn!("Polling {} failed: {}", sensor.entity_id(), e);
            STATE_UNKNOWN.to_string()
        }
    };

    let mut attributes = Attributes::new();
    attributes.insert("friendly_name".to_string(), Value::from(sensor.name()));
    attributes.insert(
        "unit_of_measurement".to_string(),
        Value::from(sensor.unit_of_measurement()),
    );

    store.set(sensor.entity_id(), state, attributes)
}

/// Publish a switch's current local state
pub fn publish_switch(switch: &dyn ToggleableSwitch, store: &StateStore) -> EntityState {
    let mut attributes = switch.attributes();
    attributes.insert("friendly_name".to_string(), Value::from(switch.name()));
    let state = if switch.is_on() { "on" } else { "off" };
    store.set(switch.entity_id(), state, attributes)
}

/// Reconcile a switch with its controller and publish the result. A failed
/// status read keeps the last known state.
pub async fn refresh_switch(switch: &dyn ToggleableSwitch, store: &StateStore) -> EntityState {
    if let Err(e) = switch.update().await {
        warn!("Updating {} failed: {}", switch.entity_id(), e);
    }
    publish_switch(switch, store)
}

/// Command a switch and publish the optimistic state.
///
/// This is the entry point for a host driving switches: look the switch up
/// with [`EntityRegistry::switch`] and pass it here. The refresh loop only
/// reads switches, so commands always come through this call.
pub async fn set_switch(switch: &dyn ToggleableSwitch, on: bool, store: &StateStore) -> Result<EntityState> {
    if on {
        switch.turn_on().await?;
    } else {
        switch.turn_off().await?;
    }
    Ok(publish_switch(switch, store))
}

/// One refresh pass over every sensor and switch in the registry
pub async fn refresh_devices(registry: &EntityRegistry, store: &StateStore) {
    for sensor in registry.sensors() {
        refresh_sensor(sensor.as_ref(), store).await;
    }
    for switch in registry.switches() {
        refresh_switch(switch.as_ref(), store).await;
    }
    debug!("Device refresh pass complete");
}
