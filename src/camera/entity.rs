use super::source::{ImageSource, StillImage};
use crate::error::Result;
use crate::events::RelayEvent;
use crate::state::{Attributes, EntityState, StateStore};
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub const STATE_STREAMING: &str = "Streaming";
pub const STATE_IDLE: &str = "Idle";

/// Proxy path serving one still image
pub fn still_image_path(entity_id: &str) -> String {
    format!("/api/camera_proxy/{}", entity_id)
}

/// Proxy path serving the MJPEG stream
pub fn stream_path(entity_id: &str) -> String {
    format!("/api/camera_proxy_stream/{}", entity_id)
}

/// A camera entity as seen by the relay.
///
/// The published state is `Streaming` while at least one MJPEG session is
/// open and `Idle` otherwise. The session count is only touched through
/// [`Camera::open_stream`] and the returned [`StreamSession`]'s drop, and the
/// count lock is held while publishing so concurrent sessions cannot publish
/// out of order.
pub struct Camera {
    entity_id: String,
    name: String,
    source: Arc<dyn ImageSource>,
    active_sessions: Mutex<usize>,
    state_store: Arc<StateStore>,
    api_password: Option<String>,
}

impl Camera {
    pub fn new(
        entity_id: String,
        name: String,
        source: Arc<dyn ImageSource>,
        state_store: Arc<StateStore>,
        api_password: Option<String>,
    ) -> Self {
        Self {
            entity_id,
            name,
            source,
            active_sessions: Mutex::new(0),
            state_store,
            api_password,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<dyn ImageSource> {
        &self.source
    }

    pub fn still_image_url(&self) -> &str {
        self.source.still_image_url()
    }

    pub fn is_streaming(&self) -> bool {
        *self.active_sessions.lock() > 0
    }

    pub fn active_sessions(&self) -> usize {
        *self.active_sessions.lock()
    }

    pub fn state(&self) -> &'static str {
        if self.is_streaming() {
            STATE_STREAMING
        } else {
            STATE_IDLE
        }
    }

    pub fn state_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("friendly_name".to_string(), Value::from(self.name.as_str()));
        attributes.insert("model_name".to_string(), Value::from(self.source.model_name()));
        attributes.insert("brand".to_string(), Value::from(self.source.brand()));
        attributes.insert(
            "still_image_url".to_string(),
            Value::from(still_image_path(&self.entity_id)),
        );
        attributes.insert("entity_picture".to_string(), Value::from(self.entity_picture()));
        attributes.insert(
            "stream_url".to_string(),
            Value::from(stream_path(&self.entity_id)),
        );
        attributes
    }

    /// Still image path carrying the API password and a cache-busting time
    fn entity_picture(&self) -> String {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let path = still_image_path(&self.entity_id);

        let mut params: Vec<(&str, String)> = Vec::with_capacity(2);
        if let Some(password) = &self.api_password {
            params.push(("api_password", password.clone()));
        }
        params.push(("time", format!("{:.3}", now)));

        // Borrow Url's query encoder; only path and query are kept.
        match Url::parse_with_params(&format!("http://relay.invalid{}", path), &params) {
            Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
            Err(_) => path,
        }
    }

    /// Publish the current state and attributes
    pub fn publish_state(&self) -> EntityState {
        let sessions = self.active_sessions.lock();
        self.publish_locked(*sessions)
    }

    fn publish_locked(&self, sessions: usize) -> EntityState {
        let state = if sessions > 0 { STATE_STREAMING } else { STATE_IDLE };
        self.state_store
            .set(&self.entity_id, state, self.state_attributes())
    }

    /// Fetch one still image with a caller-provided client
    pub async fn fetch_still_image(&self, client: &Client) -> Result<StillImage> {
        self.source.fetch_still_image(client).await
    }

    /// Register a new MJPEG session. The first concurrent session publishes
    /// `Streaming` before this returns.
    pub fn open_stream(self: &Arc<Self>) -> StreamSession {
        let session_id = Uuid::new_v4();
        {
            let mut sessions = self.active_sessions.lock();
            *sessions += 1;
            if *sessions == 1 {
                self.publish_locked(*sessions);
            }
            debug!(
                "Camera {} now has {} active sessions",
                self.entity_id, *sessions
            );
        }

        self.state_store.event_bus().publish(RelayEvent::StreamStarted {
            entity_id: self.entity_id.clone(),
            session_id: session_id.to_string(),
        });

        StreamSession {
            camera: Arc::clone(self),
            session_id,
            started: Instant::now(),
            frames: 0,
            bytes: 0,
        }
    }

    fn close_stream(&self) {
        let mut sessions = self.active_sessions.lock();
        *sessions = sessions.saturating_sub(1);
        if *sessions == 0 {
            self.publish_locked(0);
        }
        debug!(
            "Camera {} now has {} active sessions",
            self.entity_id, *sessions
        );
    }
}

/// One open MJPEG session. Dropping it ends the session exactly once.
pub struct StreamSession {
    camera: Arc<Camera>,
    session_id: Uuid,
    started: Instant,
    frames: u64,
    bytes: u64,
}

impl StreamSession {
    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn record_frame(&mut self, size: usize) {
        self.frames += 1;
        self.bytes += size as u64;
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        debug!(
            "MJPEG session {} on {} closed after {:.1}s ({} frames)",
            self.session_id,
            self.camera.entity_id,
            elapsed.as_secs_f64(),
            self.frames
        );

        self.camera.close_stream();

        self.camera
            .state_store
            .event_bus()
            .publish(RelayEvent::StreamEnded {
                entity_id: self.camera.entity_id.clone(),
                session_id: self.session_id.to_string(),
                frames: self.frames,
                bytes: self.bytes,
            });
    }
}
