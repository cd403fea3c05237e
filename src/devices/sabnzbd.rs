use super::PollableMetric;
use crate::camera::normalize_base_url;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// Client for the SABnzbd queue API
pub struct SabnzbdApi {
    api_url: String,
    api_key: String,
    client: Client,
}

impl SabnzbdApi {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            api_url: format!("{}api", normalize_base_url(base_url)),
            api_key: api_key.to_string(),
            client: Client::new(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Fetch the `queue` object
    pub async fn queue(&self) -> Result<Map<String, Value>> {
        trace!("Refreshing SABnzbd queue from {}", self.api_url);

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("mode", "queue"),
                ("output", "json"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::upstream(&self.api_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::upstream(
                &self.api_url,
                format!("HTTP status {}", status),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::upstream(&self.api_url, e))?;

        match body.get("queue") {
            Some(Value::Object(queue)) => Ok(queue.clone()),
            _ => Err(RelayError::upstream(&self.api_url, "response has no queue object")),
        }
    }
}

/// Monitored SABnzbd variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    CurrentStatus,
    Speed,
    QueueSize,
    QueueRemaining,
    DiskSize,
    DiskFree,
}

impl SensorKind {
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::CurrentStatus => "Status",
            SensorKind::Speed => "Speed",
            SensorKind::QueueSize => "Queue",
            SensorKind::QueueRemaining => "Left",
            SensorKind::DiskSize => "Disk",
            SensorKind::DiskFree => "Disk Free",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::CurrentStatus => "",
            SensorKind::Speed => "MB/s",
            SensorKind::QueueSize | SensorKind::QueueRemaining => "MB",
            SensorKind::DiskSize | SensorKind::DiskFree => "GB",
        }
    }

    /// Field of the queue object this variable reads
    fn field(&self) -> &'static str {
        match self {
            SensorKind::CurrentStatus => "status",
            SensorKind::Speed => "kbpersec",
            SensorKind::QueueSize => "mb",
            SensorKind::QueueRemaining => "mbleft",
            SensorKind::DiskSize => "diskspacetotal1",
            SensorKind::DiskFree => "diskspace1",
        }
    }

    /// Map the queue object to this variable's value
    pub fn extract(&self, queue: &Map<String, Value>) -> Option<String> {
        let raw = match queue.get(self.field())? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        match self {
            SensorKind::Speed => {
                let kb_per_sec: f64 = raw.trim().parse().ok()?;
                Some(format!("{:.1}", kb_per_sec / 1024.0))
            }
            _ => Some(raw),
        }
    }
}

impl FromStr for SensorKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "current_status" => Ok(SensorKind::CurrentStatus),
            "speed" => Ok(SensorKind::Speed),
            "queue_size" => Ok(SensorKind::QueueSize),
            "queue_remaining" => Ok(SensorKind::QueueRemaining),
            "disk_size" => Ok(SensorKind::DiskSize),
            "disk_free" => Ok(SensorKind::DiskFree),
            other => Err(RelayError::configuration(
                "sabnzbd",
                format!("sensor type \"{}\" does not exist", other),
            )),
        }
    }
}

/// One monitored SABnzbd variable exposed as a sensor
pub struct SabnzbdSensor {
    entity_id: String,
    name: String,
    kind: SensorKind,
    api: Arc<SabnzbdApi>,
}

impl SabnzbdSensor {
    pub fn new(entity_id: String, name: String, kind: SensorKind, api: Arc<SabnzbdApi>) -> Self {
        Self {
            entity_id,
            name,
            kind,
            api,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }
}

#[async_trait]
impl PollableMetric for SabnzbdSensor {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unit_of_measurement(&self) -> &str {
        self.kind.unit()
    }

    async fn poll(&self) -> Result<String> {
        let queue = self.api.queue().await?;
        self.kind.extract(&queue).ok_or_else(|| {
            RelayError::upstream(
                self.api.api_url(),
                format!("queue field {} missing or malformed", self.kind.field()),
            )
        })
    }
}
