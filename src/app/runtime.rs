use super::orchestrator::request_shutdown;
use super::{RelayApp, ShutdownReason};
use crate::error::{RelayError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

impl RelayApp {
    /// Run until a signal or a fatal component error, then shut down.
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Camera relay is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| RelayError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver.await.map_err(|_| RelayError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?.max(shutdown_reason.exit_code());

        info!("Camera relay shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            request_shutdown(
                                &shutdown_sender,
                                ShutdownReason::Signal("SIGTERM".to_string()),
                            )
                            .await;
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                request_shutdown(
                    &shutdown_sender,
                    ShutdownReason::Signal("SIGINT".to_string()),
                )
                .await;
            }
        });
    }
}
