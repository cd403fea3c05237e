use super::*;
use crate::config::RelayConfig;
use crate::events::EventBus;
use crate::state::StateStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store() -> StateStore {
    StateStore::new(Arc::new(EventBus::new(16)))
}

fn queue_body() -> serde_json::Value {
    json!({
        "queue": {
            "status": "Downloading",
            "kbpersec": "1536.0",
            "mb": "1024.5",
            "mbleft": "512.25",
            "diskspacetotal1": "931.51",
            "diskspace1": 100.2
        }
    })
}

async fn mount_queue(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("mode", "queue"))
        .and(query_param("output", "json"))
        .and(query_param("apikey", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(queue_body()))
        .mount(server)
        .await;
}

fn sab_sensor(server: &MockServer, kind: SensorKind) -> SabnzbdSensor {
    let api = Arc::new(SabnzbdApi::new(&server.uri(), "k"));
    SabnzbdSensor::new(
        format!("sensor.sab_{}", kind.label().to_lowercase().replace(' ', "_")),
        format!("SAB {}", kind.label()),
        kind,
        api,
    )
}

#[test]
fn test_sensor_kind_parsing() {
    assert_eq!("speed".parse::<SensorKind>().unwrap(), SensorKind::Speed);
    assert_eq!("disk_free".parse::<SensorKind>().unwrap(), SensorKind::DiskFree);
    assert!("upload_speed".parse::<SensorKind>().is_err());

    assert_eq!(SensorKind::Speed.unit(), "MB/s");
    assert_eq!(SensorKind::QueueRemaining.label(), "Left");
    assert_eq!(SensorKind::CurrentStatus.unit(), "");
}

#[test]
fn test_extract_fields() {
    let body = queue_body();
    let queue = body["queue"].as_object().unwrap();

    assert_eq!(SensorKind::CurrentStatus.extract(queue).as_deref(), Some("Downloading"));
    assert_eq!(SensorKind::Speed.extract(queue).as_deref(), Some("1.5"));
    assert_eq!(SensorKind::QueueSize.extract(queue).as_deref(), Some("1024.5"));
    assert_eq!(SensorKind::QueueRemaining.extract(queue).as_deref(), Some("512.25"));
    assert_eq!(SensorKind::DiskSize.extract(queue).as_deref(), Some("931.51"));
    assert_eq!(SensorKind::DiskFree.extract(queue).as_deref(), Some("100.2"));

    let empty = serde_json::Map::new();
    assert!(SensorKind::Speed.extract(&empty).is_none());
}

#[tokio::test]
async fn test_sabnzbd_poll() {
    let server = MockServer::start().await;
    mount_queue(&server).await;

    let sensor = sab_sensor(&server, SensorKind::Speed);
    assert_eq!(sensor.poll().await.unwrap(), "1.5");
    assert_eq!(sensor.kind(), SensorKind::Speed);
}

#[tokio::test]
async fn test_failed_poll_publishes_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = store();
    let sensor = sab_sensor(&server, SensorKind::QueueSize);
    let state = refresh_sensor(&sensor, &store).await;

    assert_eq!(state.state, STATE_UNKNOWN);
    assert_eq!(state.attributes["unit_of_measurement"], "MB");
    assert_eq!(state.attributes["friendly_name"], "SAB Queue");
}

#[tokio::test]
async fn test_missing_queue_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "API Key Incorrect" })))
        .mount(&server)
        .await;

    let sensor = sab_sensor(&server, SensorKind::Speed);
    assert!(sensor.poll().await.is_err());
}

async fn mount_vera(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "action"))
        .and(query_param("DeviceNum", "12"))
        .and(query_param("serviceId", SWITCH_POWER_SERVICE))
        .and(query_param("action", "SetTarget"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "variableget"))
        .and(query_param("DeviceNum", "12"))
        .and(query_param("Variable", "Status"))
        .respond_with(ResponseTemplate::new(200).set_body_string(status.to_string()))
        .mount(server)
        .await;
}

fn vera_switch(server: &MockServer, debounce: Duration) -> VeraSwitch {
    VeraSwitch::new(
        "switch.lounge".to_string(),
        "Lounge".to_string(),
        12,
        Arc::new(VeraController::new(&server.uri()).unwrap()),
        debounce,
    )
}

#[tokio::test]
async fn test_switch_command_is_optimistic_during_debounce() {
    let server = MockServer::start().await;
    mount_vera(&server, "0").await;

    let store = store();
    let switch = vera_switch(&server, Duration::from_secs(60));

    let state = set_switch(&switch, true, &store).await.unwrap();
    assert_eq!(state.state, "on");
    assert_eq!(state.attributes["vera_device_id"], 12);

    // Controller still reports off, but the read is debounced
    let state = refresh_switch(&switch, &store).await;
    assert_eq!(state.state, "on");
    assert!(switch.is_on());
}

#[tokio::test]
async fn test_switch_reconciles_after_debounce() {
    let server = MockServer::start().await;
    mount_vera(&server, "0").await;

    let store = store();
    let switch = vera_switch(&server, Duration::ZERO);

    switch.turn_on().await.unwrap();
    assert!(switch.is_on());

    let state = refresh_switch(&switch, &store).await;
    assert_eq!(state.state, "off");
}

#[tokio::test]
async fn test_switch_reads_status_without_command() {
    let server = MockServer::start().await;
    mount_vera(&server, "1\n").await;

    let switch = vera_switch(&server, Duration::from_secs(5));
    switch.update().await.unwrap();
    assert!(switch.is_on());
    assert_eq!(switch.device_id(), 12);
}

#[tokio::test]
async fn test_failed_command_keeps_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let switch = vera_switch(&server, Duration::from_secs(5));
    assert!(switch.turn_on().await.is_err());
    assert!(!switch.is_on());
}

#[tokio::test]
async fn test_status_read_in_flight_during_command_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "action"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "variableget"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("0")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let switch = Arc::new(vera_switch(&server, Duration::from_secs(60)));

    let reader = Arc::clone(&switch);
    let read = tokio::spawn(async move { reader.update().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    switch.turn_on().await.unwrap();
    assert!(switch.is_on());

    // The stale "off" lands after the command and must not win
    read.await.unwrap().unwrap();
    assert!(switch.is_on());
}

#[tokio::test]
async fn test_failed_command_does_not_debounce_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "action"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "variableget"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1"))
        .mount(&server)
        .await;

    let switch = vera_switch(&server, Duration::from_secs(60));
    assert!(switch.turn_on().await.is_err());
    assert!(!switch.is_on());

    switch.update().await.unwrap();
    assert!(switch.is_on());
}

#[tokio::test]
async fn test_armable_sensor_arms_and_reads_security_variables() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "action"))
        .and(query_param("serviceId", SECURITY_SENSOR_SERVICE))
        .and(query_param("action", "SetArmed"))
        .and(query_param("newArmedValue", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;
    for (variable, value) in [("Armed", "1"), ("Tripped", "1"), ("LastTrip", "1420070400")] {
        Mock::given(method("GET"))
            .and(path("/data_request"))
            .and(query_param("id", "variableget"))
            .and(query_param("serviceId", SECURITY_SENSOR_SERVICE))
            .and(query_param("Variable", variable))
            .respond_with(ResponseTemplate::new(200).set_body_string(value))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "variableget"))
        .and(query_param("Variable", "BatteryLevel"))
        .respond_with(ResponseTemplate::new(200).set_body_string("55"))
        .mount(&server)
        .await;

    let device = VeraDevice::from_sdata(&json!({
        "id": 15, "name": "Back Door", "category": 4,
        "armed": "0", "tripped": "0", "batterylevel": "90"
    }))
    .unwrap();
    assert_eq!(device.kind, VeraDeviceKind::ArmableSensor);
    assert!(!device.is_on);

    let store = store();
    let sensor = VeraSwitch::from_device(
        "switch.back_door".to_string(),
        device.name.clone(),
        &device,
        Arc::new(VeraController::new(&server.uri()).unwrap()),
        Duration::ZERO,
    );

    let state = set_switch(&sensor, true, &store).await.unwrap();
    assert_eq!(state.attributes["armed"], "True");
    assert_eq!(state.attributes["battery"], "90%");

    let state = refresh_switch(&sensor, &store).await;
    assert_eq!(state.state, "on");
    assert_eq!(state.attributes["tripped"], "True");
    assert_eq!(state.attributes["last_tripped"], "2015-01-01 00:00");
    assert_eq!(state.attributes["battery"], "55%");
}

#[test]
fn test_sdata_records() {
    let switch = VeraDevice::from_sdata(&json!({ "id": "12", "name": "Lounge", "category": 3, "status": 1 }))
        .unwrap();
    assert_eq!(switch.id, 12);
    assert_eq!(switch.kind, VeraDeviceKind::Switch);
    assert!(switch.is_on);
    assert!(switch.battery_level.is_none());

    assert!(VeraDevice::from_sdata(&json!({ "id": 14, "name": "Dimmer", "category": 2 })).is_none());
    assert!(VeraDevice::from_sdata(&json!({ "name": "No id", "category": 3 })).is_none());
}

#[tokio::test]
async fn test_refresh_devices_from_registry() {
    let sab = MockServer::start().await;
    mount_queue(&sab).await;
    let vera = MockServer::start().await;
    mount_vera(&vera, "1").await;

    let doc = format!(
        r#"
[[sensors]]
platform = "sabnzbd"
name = "SAB"
base_url = "{}"
api_key = "k"
monitored_variables = [{{ type = "current_status" }}, {{ type = "disk_free" }}]

[[switches]]
platform = "vera"
vera_controller_url = "{}"
device_data = [{{ vera_id = 12, name = "Lounge" }}]
"#,
        sab.uri(),
        vera.uri()
    );
    let config = RelayConfig::from_toml_str(&doc).unwrap();
    let store = Arc::new(store());
    let registry = EntityRegistry::from_config(&config, &store).await;

    refresh_devices(&registry, &store).await;

    assert_eq!(store.get("sensor.sab_status").unwrap().state, "Downloading");
    assert_eq!(store.get("sensor.sab_disk_free").unwrap().state, "100.2");
    assert_eq!(store.get("switch.lounge").unwrap().state, "on");
}

#[tokio::test]
async fn test_host_command_through_registry_lookup() {
    let vera = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data_request"))
        .and(query_param("id", "action"))
        .and(query_param("DeviceNum", "12"))
        .and(query_param("action", "SetTarget"))
        .and(query_param("newTargetValue", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&vera)
        .await;

    let doc = format!(
        r#"
[[switches]]
platform = "vera"
vera_controller_url = "{}"
device_data = [{{ vera_id = 12, name = "Lounge" }}]
"#,
        vera.uri()
    );
    let config = RelayConfig::from_toml_str(&doc).unwrap();
    let store = Arc::new(store());
    let registry = EntityRegistry::from_config(&config, &store).await;

    assert!(registry.switch("switch.missing").is_none());
    let switch = registry.switch("switch.lounge").unwrap();
    let state = set_switch(switch.as_ref(), false, &store).await.unwrap();

    assert_eq!(state.state, "off");
    assert_eq!(store.get("switch.lounge").unwrap().state, "off");
    assert_eq!(state.attributes["friendly_name"], "Lounge");
}
