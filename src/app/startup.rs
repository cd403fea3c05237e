use super::orchestrator::request_shutdown;
use super::{ComponentState, RelayApp, ShutdownReason};
use crate::devices::refresh_devices;
use crate::error::Result;
use crate::events::RelayEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

impl RelayApp {
    /// Publish initial entity states and register components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing camera relay");

        let mut states = self.component_states.lock().await;
        states.insert("relay".to_string(), ComponentState::Stopped);
        if self.registry.has_devices() {
            states.insert("devices".to_string(), ComponentState::Stopped);
        }
        drop(states);

        self.registry.publish_camera_states();

        info!("Camera relay initialized");
        Ok(())
    }

    /// Start the HTTP relay and the device refresh loop
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting camera relay");

        self.set_component_state("relay", ComponentState::Starting)
            .await;

        let server = Arc::clone(&self.server);
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        let component_states = Arc::clone(&self.component_states);
        let event_bus = Arc::clone(&self.event_bus);
        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                event_bus.publish(RelayEvent::SystemError {
                    component: "relay".to_string(),
                    error: e.to_string(),
                });
                component_states
                    .lock()
                    .await
                    .insert("relay".to_string(), ComponentState::Failed);
                request_shutdown(&shutdown_sender, ShutdownReason::Error(e.to_string())).await;
            }
        }));

        self.set_component_state("relay", ComponentState::Running)
            .await;

        if self.registry.has_devices() {
            self.set_component_state("devices", ComponentState::Starting)
                .await;
            self.start_refresh_loop();
            self.set_component_state("devices", ComponentState::Running)
                .await;
            info!(
                "Device refresh loop started ({}s interval)",
                self.config.system.refresh_interval_seconds
            );
        }

        info!("Camera relay started");
        Ok(())
    }

    /// Poll every sensor and switch on a fixed interval until cancelled
    fn start_refresh_loop(&mut self) {
        let registry = Arc::clone(&self.registry);
        let state_store = Arc::clone(&self.state_store);
        let token = self.cancellation_token.child_token();
        let period = Duration::from_secs(self.config.system.refresh_interval_seconds.max(1));

        self.refresh_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => refresh_devices(&registry, &state_store).await,
                }
            }

            debug!("Device refresh loop stopped");
        }));
    }
}
