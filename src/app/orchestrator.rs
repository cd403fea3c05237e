use super::types::{ComponentState, ShutdownReason};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::registry::EntityRegistry;
use crate::relay::RelayServer;
use crate::state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(super) type ShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Main application coordinator: owns the registry, the relay server and the
/// device refresh loop
pub struct RelayApp {
    pub(super) config: RelayConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) state_store: Arc<StateStore>,
    pub(super) registry: Arc<EntityRegistry>,
    pub(super) server: Arc<RelayServer>,

    // Background tasks
    pub(super) server_task: Option<JoinHandle<()>>,
    pub(super) refresh_task: Option<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: ShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl RelayApp {
    /// Build every configured entity and the relay server
    pub async fn new(config: RelayConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.state_bus_capacity));
        let state_store = Arc::new(StateStore::new(Arc::clone(&event_bus)));
        let registry = Arc::new(EntityRegistry::from_config(&config, &state_store).await);
        let cancellation_token = CancellationToken::new();

        let server = Arc::new(RelayServer::new(
            config.server.clone(),
            Arc::clone(&registry),
            Arc::clone(&state_store),
            cancellation_token.child_token(),
        )?);

        info!(
            "Registered {} cameras, {} sensors and {} switches",
            registry.cameras().count(),
            registry.sensors().len(),
            registry.switches().count()
        );

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            state_store,
            registry,
            server,
            server_task: None,
            refresh_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state_store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn server(&self) -> &Arc<RelayServer> {
        &self.server
    }

    /// Ask the run loop to shut down. Only the first request is kept.
    pub async fn request_shutdown(&self, reason: ShutdownReason) {
        request_shutdown(&self.shutdown_sender, reason).await;
    }
}

pub(super) async fn request_shutdown(sender: &ShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
