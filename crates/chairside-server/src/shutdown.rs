//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for tasks to drain before giving up on them.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a single shutdown signal out to the accept loop and every live
/// WebSocket session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an unsignalled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token clone for a task to select on.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Safe to call more than once.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for `handles` to finish, up to `timeout`
    /// (default 10s). Tasks still running afterwards are left to the runtime.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(task_count = handles.len(), "draining server tasks");

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown drain timed out after {timeout:?}");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unsignalled() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let session_a = coord.token();
        let session_b = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(session_a.is_cancelled());
        assert!(session_b.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_on_shutdown() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        coord.shutdown();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let task = tokio::spawn(async move {
            token.cancelled().await;
        });
        coord.graceful_shutdown(vec![task], None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_gives_up_on_stuck_tasks() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        coord
            .graceful_shutdown(vec![stuck], Some(Duration::from_millis(50)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
