use crate::camera::{build_image_source, Camera};
use crate::config::{RelayConfig, SensorConfig, SwitchConfig, VeraDeviceConfig, VeraSwitchConfig};
use crate::devices::{
    PollableMetric, SabnzbdApi, SabnzbdSensor, SensorKind, ToggleableSwitch, VeraController,
    VeraSwitch,
};
use crate::error::RelayError;
use crate::state::StateStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lowercase a display name into an entity id object part
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_underscore = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

/// Entity lookup by id, filled once at startup
#[derive(Default)]
pub struct EntityRegistry {
    cameras: BTreeMap<String, Arc<Camera>>,
    sensors: Vec<Arc<dyn PollableMetric>>,
    switches: BTreeMap<String, Arc<dyn ToggleableSwitch>>,
    taken_ids: HashSet<String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured device. Devices that cannot be built are
    /// logged and skipped.
    pub async fn from_config(config: &RelayConfig, state_store: &Arc<StateStore>) -> Self {
        let mut registry = Self::new();

        for camera_config in &config.cameras {
            let name = camera_config.name.clone().unwrap_or_else(|| "Camera".to_string());
            let entity_id = registry.generate_entity_id("camera", &name);
            let camera = Camera::new(
                entity_id,
                name,
                build_image_source(camera_config),
                Arc::clone(state_store),
                config.server.api_password.clone(),
            );
            registry.add_camera(Arc::new(camera));
        }

        for sensor_config in &config.sensors {
            match sensor_config {
                SensorConfig::Sabnzbd(sab) => {
                    let api = Arc::new(SabnzbdApi::new(&sab.base_url, &sab.api_key));
                    for variable in &sab.monitored_variables {
                        let kind = match variable.kind.parse::<SensorKind>() {
                            Ok(kind) => kind,
                            Err(e) => {
                                warn!("Skipping SABnzbd sensor: {}", e);
                                continue;
                            }
                        };
                        let name = format!("{} {}", sab.name, kind.label());
                        let entity_id = registry.generate_entity_id("sensor", &name);
                        let sensor = SabnzbdSensor::new(entity_id, name, kind, Arc::clone(&api));
                        registry.add_sensor(Arc::new(sensor));
                    }
                }
            }
        }

        let debounce = Duration::from_secs(config.system.switch_debounce_seconds);
        for switch_config in &config.switches {
            match switch_config {
                SwitchConfig::Vera(vera) => {
                    registry.add_vera_switches(vera, debounce).await;
                }
            }
        }

        info!(
            "Registry ready: {} cameras, {} sensors, {} switches",
            registry.cameras.len(),
            registry.sensors.len(),
            registry.switches.len()
        );

        registry
    }

    /// Add every switch and armable sensor listed by a Vera controller, with
    /// `device_data` name and exclude overrides applied. When the listing
    /// fails only the configured devices are added, as plain switches.
    async fn add_vera_switches(&mut self, vera: &VeraSwitchConfig, debounce: Duration) {
        let controller = match VeraController::new(&vera.vera_controller_url) {
            Ok(controller) => Arc::new(controller),
            Err(e) => {
                warn!("Skipping Vera controller {}: {}", vera.vera_controller_url, e);
                return;
            }
        };

        let overrides: HashMap<u32, &VeraDeviceConfig> = vera
            .device_data
            .iter()
            .map(|device| (device.vera_id, device))
            .collect();

        match controller.devices().await {
            Ok(devices) => {
                for device in &devices {
                    let extra = overrides.get(&device.id);
                    if extra.is_some_and(|extra| extra.exclude) {
                        debug!("Vera device {} excluded", device.id);
                        continue;
                    }
                    let name = extra
                        .and_then(|extra| extra.name.clone())
                        .unwrap_or_else(|| device.name.clone());
                    let entity_id = self.generate_entity_id("switch", &name);
                    let switch = VeraSwitch::from_device(
                        entity_id,
                        name,
                        device,
                        Arc::clone(&controller),
                        debounce,
                    );
                    self.add_switch(Arc::new(switch));
                }
            }
            Err(e) => {
                warn!(
                    "Listing Vera devices at {} failed, using configured devices only: {}",
                    vera.vera_controller_url, e
                );
                for device in vera.device_data.iter().filter(|d| !d.exclude) {
                    let name = device
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Vera Switch {}", device.vera_id));
                    let entity_id = self.generate_entity_id("switch", &name);
                    let switch = VeraSwitch::new(
                        entity_id,
                        name,
                        device.vera_id,
                        Arc::clone(&controller),
                        debounce,
                    );
                    self.add_switch(Arc::new(switch));
                }
            }
        }
    }

    /// `domain.slug`, suffixed with `_2`, `_3`, ... until unique
    pub fn generate_entity_id(&mut self, domain: &str, name: &str) -> String {
        let base = format!("{}.{}", domain, slugify(name));
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.taken_ids.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.taken_ids.insert(candidate.clone());
        candidate
    }

    pub fn add_camera(&mut self, camera: Arc<Camera>) {
        self.taken_ids.insert(camera.entity_id().to_string());
        self.cameras.insert(camera.entity_id().to_string(), camera);
    }

    pub fn add_sensor(&mut self, sensor: Arc<dyn PollableMetric>) {
        self.taken_ids.insert(sensor.entity_id().to_string());
        self.sensors.push(sensor);
    }

    pub fn add_switch(&mut self, switch: Arc<dyn ToggleableSwitch>) {
        self.taken_ids.insert(switch.entity_id().to_string());
        self.switches.insert(switch.entity_id().to_string(), switch);
    }

    pub fn camera(&self, entity_id: &str) -> Option<Arc<Camera>> {
        self.cameras.get(entity_id).cloned()
    }

    /// Like [`EntityRegistry::camera`] but as a `RelayError`
    pub fn require_camera(&self, entity_id: &str) -> Result<Arc<Camera>, RelayError> {
        self.camera(entity_id)
            .ok_or_else(|| RelayError::not_found(entity_id))
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Arc<Camera>> {
        self.cameras.values()
    }

    pub fn sensors(&self) -> &[Arc<dyn PollableMetric>] {
        &self.sensors
    }

    /// Look up a switch for a host command. Pair with
    /// [`set_switch`](crate::devices::set_switch) so the new state is published.
    pub fn switch(&self, entity_id: &str) -> Option<Arc<dyn ToggleableSwitch>> {
        self.switches.get(entity_id).cloned()
    }

    pub fn switches(&self) -> impl Iterator<Item = &Arc<dyn ToggleableSwitch>> {
        self.switches.values()
    }

    /// Whether anything needs the periodic refresh loop
    pub fn has_devices(&self) -> bool {
        !self.sensors.is_empty() || !self.switches.is_empty()
    }

    /// Publish the initial state of every camera
    pub fn publish_camera_states(&self) {
        for camera in self.cameras.values() {
            camera.publish_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE: &str = r#"
[[cameras]]
name = "Front Door"
base_url = "http://10.0.0.5:80/"
username = "admin"
password = "pw"

[[cameras]]
name = "Front-Door"
base_url = "http://10.0.0.6/"
username = "admin"
password = "pw"

[[sensors]]
platform = "sabnzbd"
name = "SAB"
base_url = "http://10.0.0.7/"
api_key = "k"
monitored_variables = [{ type = "speed" }, { type = "bogus" }, { type = "disk_free" }]
"#;

    fn store() -> Arc<StateStore> {
        Arc::new(StateStore::new(Arc::new(EventBus::new(16))))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Front Door"), "front_door");
        assert_eq!(slugify("  Garage -- Cam #2 "), "garage_cam_2");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_generate_unique_ids() {
        let mut registry = EntityRegistry::new();
        assert_eq!(registry.generate_entity_id("camera", "Door"), "camera.door");
        assert_eq!(registry.generate_entity_id("camera", "door"), "camera.door_2");
        assert_eq!(registry.generate_entity_id("camera", "DOOR"), "camera.door_3");
        assert_eq!(registry.generate_entity_id("switch", "Door"), "switch.door");
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        let registry = EntityRegistry::from_config(&config, &store()).await;

        let front = registry.camera("camera.front_door").unwrap();
        assert_eq!(front.still_image_url(), "http://10.0.0.5:80/image.jpg");
        assert!(registry.camera("camera.front_door_2").is_some());
        assert!(registry.camera("camera.back_door").is_none());
        assert!(matches!(
            registry.require_camera("camera.back_door"),
            Err(RelayError::EntityNotFound { .. })
        ));

        let sensor_ids: Vec<&str> = registry.sensors().iter().map(|s| s.entity_id()).collect();
        assert_eq!(sensor_ids, vec!["sensor.sab_speed", "sensor.sab_disk_free"]);
        assert_eq!(registry.switches().count(), 0);
        assert!(registry.has_devices());
    }

    fn vera_config(uri: &str, device_data: &str) -> RelayConfig {
        let doc = format!(
            r#"
[[switches]]
platform = "vera"
vera_controller_url = "{}"
device_data = {}
"#,
            uri, device_data
        );
        RelayConfig::from_toml_str(&doc).unwrap()
    }

    async fn mount_sdata(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/data_request"))
            .and(query_param("id", "sdata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "categories": [
                    { "id": 2, "name": "Dimmable Light" },
                    { "id": 3, "name": "Switch" },
                    { "id": 4, "name": "Security Sensor" }
                ],
                "devices": [
                    { "id": 12, "name": "Lounge", "category": 3, "status": "1" },
                    { "id": 13, "name": "Garage", "category": 3, "status": "0" },
                    { "id": 14, "name": "Hall Dimmer", "category": 2, "level": "40" },
                    { "id": 15, "name": "Back Door", "category": 4, "armed": "1",
                      "tripped": "0", "lasttrip": "1420070400", "batterylevel": "87" }
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_vera_devices_listed_from_controller() {
        let vera = MockServer::start().await;
        mount_sdata(&vera).await;

        let config = vera_config(&vera.uri(), "[]");
        let registry = EntityRegistry::from_config(&config, &store()).await;

        let switch_ids: Vec<&str> = registry.switches().map(|s| s.entity_id()).collect();
        assert_eq!(
            switch_ids,
            vec!["switch.back_door", "switch.garage", "switch.lounge"]
        );

        assert!(registry.switch("switch.lounge").unwrap().is_on());
        assert!(!registry.switch("switch.garage").unwrap().is_on());

        let sensor = registry.switch("switch.back_door").unwrap();
        assert!(sensor.is_on());
        let attributes = sensor.attributes();
        assert_eq!(attributes["battery"], "87%");
        assert_eq!(attributes["armed"], "True");
        assert_eq!(attributes["tripped"], "False");
        assert_eq!(attributes["last_tripped"], "2015-01-01 00:00");
        assert_eq!(attributes["vera_device_id"], 15);
    }

    #[tokio::test]
    async fn test_vera_device_data_overrides_listing() {
        let vera = MockServer::start().await;
        mount_sdata(&vera).await;

        let config = vera_config(
            &vera.uri(),
            r#"[{ vera_id = 12, name = "Lounge Light" }, { vera_id = 13, exclude = true }, { vera_id = 99, name = "Ghost" }]"#,
        );
        let registry = EntityRegistry::from_config(&config, &store()).await;

        let switch_ids: Vec<&str> = registry.switches().map(|s| s.entity_id()).collect();
        assert_eq!(switch_ids, vec!["switch.back_door", "switch.lounge_light"]);
        assert_eq!(
            registry.switch("switch.lounge_light").unwrap().name(),
            "Lounge Light"
        );
    }

    #[tokio::test]
    async fn test_vera_listing_failure_uses_configured_devices() {
        let vera = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data_request"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&vera)
            .await;

        let config = vera_config(
            &vera.uri(),
            r#"[{ vera_id = 12, name = "Lounge Light" }, { vera_id = 13, exclude = true }, { vera_id = 14 }]"#,
        );
        let registry = EntityRegistry::from_config(&config, &store()).await;

        let switch_ids: Vec<&str> = registry.switches().map(|s| s.entity_id()).collect();
        assert_eq!(switch_ids, vec!["switch.lounge_light", "switch.vera_switch_14"]);
    }

    #[tokio::test]
    async fn test_publish_camera_states() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        let store = store();
        let registry = EntityRegistry::from_config(&config, &store).await;

        registry.publish_camera_states();
        assert_eq!(store.get("camera.front_door").unwrap().state, "Idle");
        assert_eq!(store.get("camera.front_door_2").unwrap().state, "Idle");
    }
}
