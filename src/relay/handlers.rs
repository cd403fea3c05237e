use super::mjpeg;
use super::stream::mjpeg_stream;
use super::server::RelayState;
use crate::error::RelayError;
use crate::state::EntityState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::UpstreamFetch { .. } | RelayError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match status {
            StatusCode::NOT_FOUND => debug!("{}", self),
            StatusCode::BAD_GATEWAY => warn!("{}", self),
            _ => error!("{}", self),
        }

        (status, self.to_string()).into_response()
    }
}

/// Handler proxying one still image
pub async fn camera_proxy_handler(
    State(state): State<RelayState>,
    Path(entity_id): Path<String>,
) -> Result<Response, RelayError> {
    let camera = state.registry.require_camera(&entity_id)?;

    let image = camera
        .fetch_still_image(&state.client)
        .await
        .inspect_err(|_| state.stats.record_upstream_error())?;
    state.stats.record_still_image();

    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data).into_response())
}

/// Handler for the MJPEG relay endpoint
pub async fn camera_proxy_stream_handler(
    State(state): State<RelayState>,
    Path(entity_id): Path<String>,
) -> Result<Response, RelayError> {
    let camera = state.registry.require_camera(&entity_id)?;

    // Each session gets its own upstream pool, released when the stream ends
    let client = Client::builder().build()?;

    let session = camera.open_stream();
    info!(
        "MJPEG session {} opened on {}",
        session.session_id(),
        entity_id
    );

    let stream = mjpeg_stream(
        session,
        client,
        Arc::clone(&state.stats),
        state.shutdown.child_token(),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mjpeg::CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| RelayError::system(format!("Failed to build stream response: {}", e)))
}

/// Every published entity state
pub async fn states_handler(State(state): State<RelayState>) -> Json<Vec<EntityState>> {
    Json(state.state_store.all())
}

/// One published entity state
pub async fn entity_state_handler(
    State(state): State<RelayState>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, RelayError> {
    state
        .state_store
        .get(&entity_id)
        .map(Json)
        .ok_or_else(|| RelayError::not_found(entity_id))
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let streaming: Vec<&str> = state
        .registry
        .cameras()
        .filter(|camera| camera.is_streaming())
        .map(|camera| camera.entity_id())
        .collect();

    let health_info = serde_json::json!({
        "status": "healthy",
        "cameras": state.registry.cameras().count(),
        "streaming": streaming,
        "relay": state.stats.snapshot(),
        "subscribers": state.state_store.event_bus().subscriber_count(),
    });

    (StatusCode::OK, Json(health_info))
}
