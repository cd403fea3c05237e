use super::auth::require_api_password;
use super::handlers::{
    camera_proxy_handler, camera_proxy_stream_handler, entity_state_handler, health_handler,
    states_handler,
};
use super::stats::{RelayStats, StreamStats};
use crate::{
    config::ServerConfig,
    error::{RelayError, Result, StreamError},
    registry::EntityRegistry,
    state::StateStore,
};
use axum::{middleware, routing::get, Router};
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct RelayState {
    pub(crate) registry: Arc<EntityRegistry>,
    pub(crate) state_store: Arc<StateStore>,
    pub(crate) client: Client,
    pub(crate) stats: Arc<RelayStats>,
    pub(crate) api_password: Option<String>,
    pub(crate) shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(
        registry: Arc<EntityRegistry>,
        state_store: Arc<StateStore>,
        api_password: Option<String>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            state_store,
            client: Client::builder().build()?,
            stats: Arc::new(RelayStats::default()),
            api_password,
            shutdown,
        })
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.snapshot()
    }
}

/// Build the relay's HTTP routes
pub fn router(state: RelayState) -> Router {
    let api = Router::new()
        .route("/api/camera_proxy/:entity_id", get(camera_proxy_handler))
        .route(
            "/api/camera_proxy_stream/:entity_id",
            get(camera_proxy_stream_handler),
        )
        .route("/api/states", get(states_handler))
        .route("/api/states/:entity_id", get(entity_state_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_password,
        ));

    Router::new()
        .merge(api)
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP relay serving camera proxies and published states
pub struct RelayServer {
    pub(crate) config: ServerConfig,
    pub(crate) state: RelayState,
}

impl RelayServer {
    pub fn new(
        config: ServerConfig,
        registry: Arc<EntityRegistry>,
        state_store: Arc<StateStore>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let state = RelayState::new(
            registry,
            state_store,
            config.api_password.clone(),
            shutdown,
        )?;

        Ok(Self { config, state })
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Bind and serve until the shutdown token fires
    pub async fn start(&self) -> Result<()> {
        let app = router(self.state.clone());
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting camera relay on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| StreamError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("Camera relay listening on {}", addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Camera relay on {} stopped", addr);
        Ok(())
    }
}

/// Relay server builder for configuration
pub struct RelayServerBuilder {
    config: Option<ServerConfig>,
    registry: Option<Arc<EntityRegistry>>,
    state_store: Option<Arc<StateStore>>,
    shutdown: Option<CancellationToken>,
}

impl RelayServerBuilder {
    /// Create a new relay server builder
    pub fn new() -> Self {
        Self {
            config: None,
            registry: None,
            state_store: None,
            shutdown: None,
        }
    }

    /// Set the server configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the entity registry
    pub fn registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the state store
    pub fn state_store(mut self, state_store: Arc<StateStore>) -> Self {
        self.state_store = Some(state_store);
        self
    }

    /// Set the shutdown token; a fresh one is used otherwise
    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the relay server
    pub fn build(self) -> Result<RelayServer> {
        let config = self.config.ok_or_else(|| {
            RelayError::Stream(StreamError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let registry = self.registry.ok_or_else(|| {
            RelayError::Stream(StreamError::StartupFailed {
                details: "Entity registry is required".to_string(),
            })
        })?;

        let state_store = self.state_store.ok_or_else(|| {
            RelayError::Stream(StreamError::StartupFailed {
                details: "State store is required".to_string(),
            })
        })?;

        RelayServer::new(
            config,
            registry,
            state_store,
            self.shutdown.unwrap_or_default(),
        )
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
