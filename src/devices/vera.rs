use super::ToggleableSwitch;
use crate::camera::normalize_base_url;
use crate::error::{RelayError, Result};
use crate::state::Attributes;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// UPnP service controlling binary switches
pub const SWITCH_POWER_SERVICE: &str = "urn:upnp-org:serviceId:SwitchPower1";

/// Service carrying the arm, trip and last-trip variables of security sensors
pub const SECURITY_SENSOR_SERVICE: &str = "urn:micasaverde-com:serviceId:SecuritySensor1";

/// Service carrying the battery level of battery powered devices
pub const HA_DEVICE_SERVICE: &str = "urn:micasaverde-com:serviceId:HaDevice1";

const CATEGORY_SWITCH: u64 = 3;
const CATEGORY_ARMABLE_SENSOR: u64 = 4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which Vera capability a switch entity drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VeraDeviceKind {
    /// On/off switch, driven through `SwitchPower1`
    Switch,
    /// Security sensor; "on" means armed
    ArmableSensor,
}

impl VeraDeviceKind {
    fn from_category(category: u64) -> Option<Self> {
        match category {
            CATEGORY_SWITCH => Some(VeraDeviceKind::Switch),
            CATEGORY_ARMABLE_SENSOR => Some(VeraDeviceKind::ArmableSensor),
            _ => None,
        }
    }

    fn service(&self) -> &'static str {
        match self {
            VeraDeviceKind::Switch => SWITCH_POWER_SERVICE,
            VeraDeviceKind::ArmableSensor => SECURITY_SENSOR_SERVICE,
        }
    }

    fn status_variable(&self) -> &'static str {
        match self {
            VeraDeviceKind::Switch => "Status",
            VeraDeviceKind::ArmableSensor => "Armed",
        }
    }

    fn action(&self) -> (&'static str, &'static str) {
        match self {
            VeraDeviceKind::Switch => ("SetTarget", "newTargetValue"),
            VeraDeviceKind::ArmableSensor => ("SetArmed", "newArmedValue"),
        }
    }
}

/// One device from the controller's `sdata` listing
#[derive(Debug, Clone, PartialEq)]
pub struct VeraDevice {
    pub id: u32,
    pub name: String,
    pub kind: VeraDeviceKind,
    pub is_on: bool,
    pub battery_level: Option<String>,
    pub tripped: Option<bool>,
    pub last_trip: Option<i64>,
}

impl VeraDevice {
    /// Map one `sdata` device record. Devices that are neither switches nor
    /// armable sensors yield `None`.
    pub fn from_sdata(record: &Value) -> Option<Self> {
        let id = u32::try_from(number_field(record, "id")?).ok()?;
        let kind = VeraDeviceKind::from_category(number_field(record, "category")?)?;
        let status_key = match kind {
            VeraDeviceKind::Switch => "status",
            VeraDeviceKind::ArmableSensor => "armed",
        };

        Some(Self {
            id,
            name: text_field(record, "name").unwrap_or_else(|| format!("Vera Switch {}", id)),
            kind,
            is_on: text_field(record, status_key).as_deref() == Some("1"),
            battery_level: text_field(record, "batterylevel"),
            tripped: text_field(record, "tripped").map(|v| v == "1"),
            last_trip: text_field(record, "lasttrip").and_then(|v| v.parse().ok()),
        })
    }
}

/// `sdata` mixes strings and numbers for the same fields across firmwares
fn text_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(record: &Value, key: &str) -> Option<u64> {
    text_field(record, key)?.trim().parse().ok()
}

/// Client for a Vera controller's `data_request` API
pub struct VeraController {
    data_request_url: String,
    client: Client,
}

impl VeraController {
    pub fn new(controller_url: &str) -> Result<Self> {
        Ok(Self {
            data_request_url: format!("{}data_request", normalize_base_url(controller_url)),
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    async fn data_request(&self, params: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(&self.data_request_url)
            .query(params)
            .send()
            .await
            .map_err(|e| RelayError::upstream(&self.data_request_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::upstream(
                &self.data_request_url,
                format!("HTTP status {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| RelayError::upstream(&self.data_request_url, e))
    }

    /// Every switch and armable sensor the controller knows
    pub async fn devices(&self) -> Result<Vec<VeraDevice>> {
        let body = self
            .data_request(&[("id", "sdata".to_string()), ("output_format", "json".to_string())])
            .await?;
        let data: Value = serde_json::from_str(&body)
            .map_err(|e| RelayError::upstream(&self.data_request_url, e))?;

        let records = data
            .get("devices")
            .and_then(Value::as_array)
            .ok_or_else(|| RelayError::upstream(&self.data_request_url, "sdata has no device list"))?;

        Ok(records.iter().filter_map(VeraDevice::from_sdata).collect())
    }

    /// Read one device variable
    pub async fn variable(&self, device_id: u32, service: &str, variable: &str) -> Result<String> {
        let body = self
            .data_request(&[
                ("id", "variableget".to_string()),
                ("DeviceNum", device_id.to_string()),
                ("serviceId", service.to_string()),
                ("Variable", variable.to_string()),
            ])
            .await?;
        Ok(body.trim().to_string())
    }

    /// Read the on (or armed) status; `1` means on
    pub async fn status(&self, device_id: u32, kind: VeraDeviceKind) -> Result<bool> {
        let value = self
            .variable(device_id, kind.service(), kind.status_variable())
            .await?;
        Ok(value == "1")
    }

    pub async fn set_state(&self, device_id: u32, kind: VeraDeviceKind, on: bool) -> Result<()> {
        let (action, argument) = kind.action();
        self.data_request(&[
            ("id", "action".to_string()),
            ("DeviceNum", device_id.to_string()),
            ("serviceId", kind.service().to_string()),
            ("action", action.to_string()),
            (argument, if on { "1" } else { "0" }.to_string()),
        ])
        .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Readings {
    battery_level: Option<String>,
    tripped: Option<bool>,
    last_trip: Option<i64>,
}

/// A Vera switch or armable sensor.
///
/// Commands set the local state optimistically. Status reads are ignored
/// until `debounce` has passed since the last successful command, since the
/// controller lags behind its own actions. A read that was in flight while a
/// command went out is discarded.
pub struct VeraSwitch {
    entity_id: String,
    name: String,
    device_id: u32,
    kind: VeraDeviceKind,
    controller: Arc<VeraController>,
    debounce: Duration,
    is_on: AtomicBool,
    commands_issued: AtomicU64,
    last_command: Mutex<Option<Instant>>,
    readings: Mutex<Readings>,
}

impl VeraSwitch {
    pub fn new(
        entity_id: String,
        name: String,
        device_id: u32,
        controller: Arc<VeraController>,
        debounce: Duration,
    ) -> Self {
        Self {
            entity_id,
            name,
            device_id,
            kind: VeraDeviceKind::Switch,
            controller,
            debounce,
            is_on: AtomicBool::new(false),
            commands_issued: AtomicU64::new(0),
            last_command: Mutex::new(None),
            readings: Mutex::new(Readings::default()),
        }
    }

    /// Build from a listed device, seeding state and readings from the listing
    pub fn from_device(
        entity_id: String,
        name: String,
        device: &VeraDevice,
        controller: Arc<VeraController>,
        debounce: Duration,
    ) -> Self {
        let switch = Self::new(entity_id, name, device.id, controller, debounce);
        Self {
            kind: device.kind,
            is_on: AtomicBool::new(device.is_on),
            readings: Mutex::new(Readings {
                battery_level: device.battery_level.clone(),
                tripped: device.tripped,
                last_trip: device.last_trip,
            }),
            ..switch
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn kind(&self) -> VeraDeviceKind {
        self.kind
    }

    fn debouncing(&self) -> bool {
        match *self.last_command.lock() {
            Some(sent) => sent.elapsed() < self.debounce,
            None => false,
        }
    }

    async fn command(&self, on: bool) -> Result<()> {
        self.commands_issued.fetch_add(1, Ordering::SeqCst);
        self.controller
            .set_state(self.device_id, self.kind, on)
            .await?;
        *self.last_command.lock() = Some(Instant::now());
        self.is_on.store(on, Ordering::SeqCst);
        info!("Switch {} turned {}", self.entity_id, if on { "on" } else { "off" });
        Ok(())
    }

    async fn refresh_status(&self) -> Result<()> {
        if self.debouncing() {
            debug!("Switch {} status read skipped (debounce)", self.entity_id);
            return Ok(());
        }

        let issued = self.commands_issued.load(Ordering::SeqCst);
        let on = self.controller.status(self.device_id, self.kind).await?;

        if self.commands_issued.load(Ordering::SeqCst) != issued || self.debouncing() {
            debug!(
                "Switch {} status read discarded, a command was sent meanwhile",
                self.entity_id
            );
            return Ok(());
        }

        self.is_on.store(on, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_readings(&self) -> Result<()> {
        let has_battery = self.readings.lock().battery_level.is_some();
        if has_battery {
            let level = self
                .controller
                .variable(self.device_id, HA_DEVICE_SERVICE, "BatteryLevel")
                .await?;
            self.readings.lock().battery_level = Some(level);
        }

        if self.kind == VeraDeviceKind::ArmableSensor {
            let tripped = self
                .controller
                .variable(self.device_id, SECURITY_SENSOR_SERVICE, "Tripped")
                .await?;
            let last_trip = self
                .controller
                .variable(self.device_id, SECURITY_SENSOR_SERVICE, "LastTrip")
                .await?;

            let mut readings = self.readings.lock();
            readings.tripped = Some(tripped == "1");
            readings.last_trip = last_trip.parse().ok();
        }

        Ok(())
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[async_trait]
impl ToggleableSwitch for VeraSwitch {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_on(&self) -> bool {
        self.is_on.load(Ordering::SeqCst)
    }

    async fn turn_on(&self) -> Result<()> {
        self.command(true).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.command(false).await
    }

    async fn update(&self) -> Result<()> {
        self.refresh_status().await?;
        self.refresh_readings().await
    }

    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        let readings = self.readings.lock();

        if let Some(level) = &readings.battery_level {
            attributes.insert("battery".to_string(), Value::from(format!("{}%", level)));
        }

        if self.kind == VeraDeviceKind::ArmableSensor {
            attributes.insert("armed".to_string(), Value::from(flag(self.is_on())));
            if let Some(tripped) = readings.tripped {
                attributes.insert("tripped".to_string(), Value::from(flag(tripped)));
            }
            // UTC; the controller reports epoch seconds
            if let Some(when) = readings.last_trip.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
                attributes.insert(
                    "last_tripped".to_string(),
                    Value::from(when.format("%Y-%m-%d %H:%M").to_string()),
                );
            }
        }

        attributes.insert("vera_device_id".to_string(), Value::from(self.device_id));
        attributes
    }
}
