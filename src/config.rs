use crate::error::RelayError;
use config::{Config, ConfigError, Environment, File, FileFormat, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

const REDACTED: &str = "********";

/// Top-level relay configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub system: SystemConfig,
    #[serde(default)]
    pub cameras: Vec<CameraDeviceConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Shared password required on the API; no check when unset
    #[serde(default)]
    pub api_password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Seconds between sensor and switch refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Seconds a switch ignores polled status after a local command
    #[serde(default = "default_switch_debounce")]
    pub switch_debounce_seconds: u64,

    /// State bus channel capacity
    #[serde(default = "default_state_bus_capacity")]
    pub state_bus_capacity: usize,
}

/// Camera adapter family
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraPlatform {
    Generic,
    Dlink,
}

/// One IP camera record
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraDeviceConfig {
    /// Display name, also the source of the entity id
    #[serde(default)]
    pub name: Option<String>,

    /// Base URL of the camera, e.g. http://192.168.1.21:2112/
    pub base_url: String,

    pub username: String,
    pub password: String,

    /// Adapter selection; falls back to the brand when absent
    #[serde(default)]
    pub platform: Option<CameraPlatform>,

    #[serde(default)]
    pub brand: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Still image path relative to base_url (defaults to image.jpg)
    #[serde(default)]
    pub still_image_url: Option<String>,
}

impl CameraDeviceConfig {
    /// Resolve the adapter family for this record
    pub fn platform(&self) -> CameraPlatform {
        match (self.platform, self.brand.as_deref()) {
            (Some(platform), _) => platform,
            (None, Some(brand)) if brand.eq_ignore_ascii_case("dlink") => CameraPlatform::Dlink,
            _ => CameraPlatform::Generic,
        }
    }

    /// Name used in log lines and error messages
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.base_url)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RelayError::configuration(
                self.label(),
                "base_url must start with http:// or https://",
            ));
        }
        if self.username.is_empty() {
            return Err(RelayError::configuration(self.label(), "username is required"));
        }
        Ok(())
    }
}

/// Sensor platforms, selected by the `platform` key
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum SensorConfig {
    Sabnzbd(SabnzbdConfig),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SabnzbdConfig {
    #[serde(default = "default_sabnzbd_name")]
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub monitored_variables: Vec<MonitoredVariable>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitoredVariable {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Switch platforms, selected by the `platform` key
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum SwitchConfig {
    Vera(VeraSwitchConfig),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VeraSwitchConfig {
    /// Controller URL including port, e.g. http://192.168.1.21:3480/
    pub vera_controller_url: String,
    #[serde(default)]
    pub device_data: Vec<VeraDeviceConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VeraDeviceConfig {
    pub vera_id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exclude: bool,
}

impl RelayConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Self::builder()?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("CAMRELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_settings(settings)
    }

    /// Load configuration from an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = Self::builder()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Self::from_settings(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port() as i64)?
            .set_default(
                "system.refresh_interval_seconds",
                default_refresh_interval() as i64,
            )?
            .set_default(
                "system.switch_debounce_seconds",
                default_switch_debounce() as i64,
            )?
            .set_default(
                "system.state_bus_capacity",
                default_state_bus_capacity() as i64,
            )
    }

    fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let server: ServerConfig = settings.get("server")?;
        let system: SystemConfig = settings.get("system")?;

        let cameras: Vec<CameraDeviceConfig> = device_records(&settings, "cameras")?
            .into_iter()
            .filter(|camera: &CameraDeviceConfig| match camera.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping camera: {}", e);
                    false
                }
            })
            .collect();
        let sensors = device_records(&settings, "sensors")?;
        let switches = device_records(&settings, "switches")?;

        let config = RelayConfig {
            server,
            system,
            cameras,
            sensors,
            switches,
        };

        info!(
            "Configuration loaded: {} cameras, {} sensor platforms, {} switch platforms",
            config.cameras.len(),
            config.sensors.len(),
            config.switches.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Render the effective configuration as TOML with secrets masked
    pub fn to_redacted_toml(&self) -> Result<String, RelayError> {
        let mut redacted = self.clone();
        if redacted.server.api_password.is_some() {
            redacted.server.api_password = Some(REDACTED.to_string());
        }
        for camera in &mut redacted.cameras {
            camera.password = REDACTED.to_string();
        }
        for sensor in &mut redacted.sensors {
            match sensor {
                SensorConfig::Sabnzbd(sabnzbd) => sabnzbd.api_key = REDACTED.to_string(),
            }
        }
        Ok(toml::to_string_pretty(&redacted)?)
    }

    /// Validate configuration values
    /// Check port, refresh interval and state bus capacity. Any switch
    /// debounce is accepted; zero disables it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.system.refresh_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Refresh interval must be greater than 0".to_string(),
            ));
        }

        if self.system.state_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "State bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Deserialize a device list record by record, skipping malformed entries
fn device_records<T: DeserializeOwned>(settings: &Config, key: &str) -> Result<Vec<T>, ConfigError> {
    let values: Vec<Value> = match settings.get_array(key) {
        Ok(values) => values,
        Err(ConfigError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match value.try_deserialize::<T>() {
            Ok(record) => records.push(record),
            Err(e) => {
                let err = RelayError::configuration(format!("{}[{}]", key, index), e);
                warn!("Skipping device record: {}", err);
            }
        }
    }

    Ok(records)
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
                api_password: None,
            },
            system: SystemConfig {
                refresh_interval_seconds: default_refresh_interval(),
                switch_debounce_seconds: default_switch_debounce(),
                state_bus_capacity: default_state_bus_capacity(),
            },
            cameras: Vec::new(),
            sensors: Vec::new(),
            switches: Vec::new(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8123
}

fn default_refresh_interval() -> u64 {
    30
}
fn default_switch_debounce() -> u64 {
    5
}
fn default_state_bus_capacity() -> usize {
    100
}

fn default_sabnzbd_name() -> String {
    "SABnzbd".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 9000
api_password = "secret"

[[cameras]]
name = "Front Door"
base_url = "http://10.0.0.5:80"
username = "admin"
password = "pw"

[[cameras]]
name = "Garage"
brand = "dlink"
model = "DCS-930L"
base_url = "http://10.0.0.6/"
username = "admin"
password = "pw"
still_image_url = "snapshot.cgi"

[[sensors]]
platform = "sabnzbd"
name = "SAB"
base_url = "http://10.0.0.7:8080/"
api_key = "abc"
monitored_variables = [{ type = "speed" }, { type = "queue_size" }]

[[switches]]
platform = "vera"
vera_controller_url = "http://10.0.0.8:3480/"
device_data = [{ vera_id = 12, name = "Lounge" }, { vera_id = 13, exclude = true }]
"#;

    #[test]
    fn test_redacted_toml_masks_secrets() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_redacted_toml().unwrap();

        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("\"pw\""));
        assert!(!rendered.contains("abc"));
        assert!(rendered.contains("port = 9000"));

        // The masked document still loads
        let reloaded = RelayConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reloaded.cameras.len(), 2);
        assert_eq!(reloaded.sensors.len(), 1);
        assert_eq!(reloaded.server.api_password.as_deref(), Some("********"));
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.system.switch_debounce_seconds, 5);
    }

    #[test]
    fn test_parse_full_document() {
        let config = RelayConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.server.api_password.as_deref(), Some("secret"));
        assert_eq!(config.system.refresh_interval_seconds, 30);

        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].platform(), CameraPlatform::Generic);
        assert_eq!(config.cameras[1].platform(), CameraPlatform::Dlink);
        assert_eq!(config.cameras[1].still_image_url.as_deref(), Some("snapshot.cgi"));

        match &config.sensors[0] {
            SensorConfig::Sabnzbd(sab) => {
                assert_eq!(sab.name, "SAB");
                assert_eq!(sab.monitored_variables.len(), 2);
                assert_eq!(sab.monitored_variables[0].kind, "speed");
            }
        }

        match &config.switches[0] {
            SwitchConfig::Vera(vera) => {
                assert_eq!(vera.device_data.len(), 2);
                assert!(vera.device_data[1].exclude);
            }
        }
    }

    #[test]
    fn test_malformed_camera_is_skipped() {
        let doc = r#"
[[cameras]]
name = "No credentials"
base_url = "http://10.0.0.5/"

[[cameras]]
name = "Bad scheme"
base_url = "rtsp://10.0.0.5/"
username = "u"
password = "p"

[[cameras]]
name = "Good"
base_url = "http://10.0.0.9/"
username = "u"
password = "p"
"#;
        let config = RelayConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.cameras.len(), 1);
        assert_eq!(config.cameras[0].name.as_deref(), Some("Good"));
    }

    #[test]
    fn test_unknown_platform_is_skipped() {
        let doc = r#"
[[sensors]]
platform = "transmission"
host = "localhost"

[[sensors]]
platform = "sabnzbd"
base_url = "http://10.0.0.7/"
api_key = "k"
"#;
        let config = RelayConfig::from_toml_str(doc).unwrap();
        assert_eq!(config.sensors.len(), 1);
        match &config.sensors[0] {
            SensorConfig::Sabnzbd(sab) => assert_eq!(sab.name, "SABnzbd"),
        }
    }

    #[test]
    fn test_brand_platform_precedence() {
        let mut camera = CameraDeviceConfig {
            name: None,
            base_url: "http://cam/".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            platform: None,
            brand: Some("DLink".to_string()),
            model: None,
            still_image_url: None,
        };
        assert_eq!(camera.platform(), CameraPlatform::Dlink);

        camera.platform = Some(CameraPlatform::Generic);
        assert_eq!(camera.platform(), CameraPlatform::Generic);
        assert_eq!(camera.label(), "http://cam/");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = RelayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RelayConfig::default();
        config.system.refresh_interval_seconds = 0;
        assert!(config.validate().is_err());

        config.system.refresh_interval_seconds = 10;
        assert!(config.validate().is_ok());

        config.system.state_bus_capacity = 0;
        assert!(config.validate().is_err());
        config.system.state_bus_capacity = 16;

        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 8123;

        // Zero turns the switch debounce off
        config.system.switch_debounce_seconds = 0;
        assert!(config.validate().is_ok());
    }
}
