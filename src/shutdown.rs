//! Graceful shutdown coordination.
//!
//! Note: This module appears as "dead code" in library checks because it's
//! only used by the binary (main.rs), which registers the long-running
//! tasks and blocks on `wait_for_shutdown`.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ShutdownManager {
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
        }
    }

    /// Token handed to every long-running task; cancellation is the shutdown
    /// signal
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Block until ctrl+c, then cancel and drain all registered tasks with a
    /// bounded grace period.
    pub async fn wait_for_shutdown(mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }

        tracing::info!("🛑 Shutdown signal received");
        self.cancel_token.cancel();

        let drain = std::pin::pin!(async {
            for handle in self.task_handles.drain(..) {
                let _ = handle.await;
            }
        });

        match tokio::time::timeout(tokio::time::Duration::from_secs(10), drain).await {
            Ok(_) => tracing::info!("✓ All tasks shut down gracefully"),
            Err(_) => tracing::warn!("⏱️  Shutdown timeout: some tasks did not complete"),
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
