//! SIGINT / SIGTERM handling.
//!
//! A signal cancels the run token: in-flight downloads discard their temp
//! files, remaining work is skipped and the metadata store is still saved.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Turns process signals into cancellation of one run.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to the orchestrator.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the run without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then cancel the token.
    ///
    /// Returns early if the token is cancelled some other way. A handler that
    /// cannot be installed is logged and never fires.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), finishing in-flight work and saving metadata...");
            }
            _ = terminate => {
                info!("Received SIGTERM, finishing in-flight work and saving metadata...");
            }
            _ = self.token.cancelled() => return,
        }

        self.token.cancel();
    }
}
