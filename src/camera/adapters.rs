use super::source::{
    join_url, normalize_base_url, Credentials, ImageSource, DEFAULT_STILL_IMAGE_PATH,
};
use crate::config::{CameraDeviceConfig, CameraPlatform};
use async_trait::async_trait;
use std::sync::Arc;

const GENERIC: &str = "generic";

/// Any camera exposing a basic-auth JPEG snapshot URL
#[derive(Debug)]
pub struct GenericCamera {
    still_image_url: String,
    credentials: Credentials,
    brand: String,
    model: String,
}

impl GenericCamera {
    pub fn new(config: &CameraDeviceConfig) -> Self {
        let base_url = normalize_base_url(&config.base_url);
        let path = config
            .still_image_url
            .as_deref()
            .unwrap_or(DEFAULT_STILL_IMAGE_PATH);

        Self {
            still_image_url: join_url(&base_url, path),
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            brand: config.brand.clone().unwrap_or_else(|| GENERIC.to_string()),
            model: config.model.clone().unwrap_or_else(|| GENERIC.to_string()),
        }
    }
}

#[async_trait]
impl ImageSource for GenericCamera {
    fn still_image_url(&self) -> &str {
        &self.still_image_url
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn brand(&self) -> &str {
        &self.brand
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// D-Link IP camera
#[derive(Debug)]
pub struct DlinkCamera {
    still_image_url: String,
    credentials: Credentials,
    model: String,
}

impl DlinkCamera {
    pub fn new(config: &CameraDeviceConfig) -> Self {
        let base_url = normalize_base_url(&config.base_url);
        let path = config
            .still_image_url
            .as_deref()
            .unwrap_or(DEFAULT_STILL_IMAGE_PATH);

        Self {
            still_image_url: join_url(&base_url, path),
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            model: config.model.clone().unwrap_or_else(|| GENERIC.to_string()),
        }
    }
}

#[async_trait]
impl ImageSource for DlinkCamera {
    fn still_image_url(&self) -> &str {
        &self.still_image_url
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn brand(&self) -> &str {
        "dlink"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pick the adapter for a camera record
pub fn build_image_source(config: &CameraDeviceConfig) -> Arc<dyn ImageSource> {
    match config.platform() {
        CameraPlatform::Generic => Arc::new(GenericCamera::new(config)),
        CameraPlatform::Dlink => Arc::new(DlinkCamera::new(config)),
    }
}
