use super::server::RelayState;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::warn;

/// Header carrying the API password
pub const AUTH_HEADER: &str = "x-ha-access";

/// Query parameter carrying the API password
pub const AUTH_QUERY_PARAM: &str = "api_password";

/// Reject requests without the configured API password. With no password
/// configured every request passes.
pub async fn require_api_password(
    State(state): State<RelayState>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_password.as_deref() else {
        return next.run(request).await;
    };

    let from_header = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok());
    let from_query = params.get(AUTH_QUERY_PARAM).map(String::as_str);

    if from_header == Some(expected) || from_query == Some(expected) {
        next.run(request).await
    } else {
        warn!("Rejected unauthenticated request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED.into_response()
    }
}
