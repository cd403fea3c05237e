use crate::error::{RelayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::fmt;
use tracing::{debug, trace};

/// Default still image path relative to the camera's base URL
pub const DEFAULT_STILL_IMAGE_PATH: &str = "image.jpg";

/// Content type assumed when the camera omits one
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Basic-auth credentials for an upstream camera
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One still image as returned by the camera
#[derive(Debug, Clone)]
pub struct StillImage {
    pub data: Bytes,
    pub content_type: String,
}

/// Ensure a base URL ends with exactly one trailing separator
pub fn normalize_base_url(base_url: &str) -> String {
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    }
}

/// Join a camera-relative path onto a normalized base URL
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url, path.trim_start_matches('/'))
}

/// A device that can hand out JPEG snapshots over HTTP
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Absolute URL of the upstream snapshot endpoint
    fn still_image_url(&self) -> &str;

    fn credentials(&self) -> &Credentials;

    fn brand(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Fetch one snapshot with basic auth. Non-2xx answers are errors.
    async fn fetch_still_image(&self, client: &Client) -> Result<StillImage> {
        fetch_still_image(client, self.still_image_url(), self.credentials()).await
    }
}

pub(crate) async fn fetch_still_image(
    client: &Client,
    url: &str,
    credentials: &Credentials,
) -> Result<StillImage> {
    trace!("Fetching still image from {}", url);

    let response = client
        .get(url)
        .basic_auth(&credentials.username, Some(&credentials.password))
        .send()
        .await
        .map_err(|e| RelayError::upstream(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::upstream(url, format!("HTTP status {}", status)));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let data = response
        .bytes()
        .await
        .map_err(|e| RelayError::upstream(url, e))?;

    debug!("Fetched {} bytes ({}) from {}", data.len(), content_type, url);

    Ok(StillImage { data, content_type })
}
