//! Server-wide stop signal and the join point for connection tasks.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Coordinates shutdown of the listener and every live connection.
///
/// Each connection's `done` signal is a child of [`token`](Self::token), and
/// each upgraded socket's task is tracked, so cancelling here stops all pumps
/// and [`graceful_shutdown`](Self::graceful_shutdown) can join them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with an uncancelled token and an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root stop token; connections derive their `done` signal from it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for connection tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Signal every connection to stop without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of connection tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel everything and wait up to `timeout` for tracked tasks to finish.
    ///
    /// Returns `true` if every task finished in time.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tracker.close();
        let pending = self.tracker.len();
        info!(pending, ?timeout, "draining connections");

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("connections drained");
                true
            }
            Err(_) => {
                warn!(remaining = self.tracker.len(), ?timeout, "drain timed out");
                false
            }
        }
    }
}
