use super::{ComponentState, RelayApp};
use crate::error::{RelayError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

impl RelayApp {
    /// Cancel every background task and wait for them to finish
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Open MJPEG sessions observe this and publish Idle on the way out
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        let refresh_task = self.refresh_task.take();
        if let Err(e) = self
            .stop_component("devices", refresh_task, Duration::from_secs(5))
            .await
        {
            error!("Error stopping devices: {}", e);
            exit_code = 1;
        }

        let server_task = self.server_task.take();
        if let Err(e) = self
            .stop_component("relay", server_task, Duration::from_secs(10))
            .await
        {
            error!("Error stopping relay: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for one component's task to exit
    async fn stop_component(
        &self,
        component: &str,
        task: Option<JoinHandle<()>>,
        limit: Duration,
    ) -> Result<()> {
        let Some(task) = task else {
            if self.get_component_state(component).await.is_some() {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
            }
            return Ok(());
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(RelayError::system(format!(
                    "{} component task failed: {}",
                    component, e
                )))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(RelayError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
